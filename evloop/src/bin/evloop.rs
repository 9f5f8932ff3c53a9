// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words evloop

//! Runs one event loop scenario and prints what it observed. For example:
//!
//! ```text
//! evloop oneshot --delay-ms 250
//! evloop periodic --runs 5 --every-ms 200
//! evloop cancel
//! evloop chain --count 3
//! evloop signal --enable-logging
//! ```

use clap::Parser;
use r3bl_evloop::{demo::{CLIArg, run_command},
                  setup_default_miette_global_report_handler,
                  try_initialize_logging_global};

const ISSUES_URL: &str = "https://github.com/r3bl-org/r3bl-open-core/issues/new";

fn main() -> miette::Result<()> {
    setup_default_miette_global_report_handler(ISSUES_URL);

    // If no args are passed, the following line will fail, and help will be printed
    // thanks to `arg_required_else_help(true)` in the `CLIArg` struct.
    let cli_arg = CLIArg::parse();

    let enable_logging = cli_arg.global_options.enable_logging;
    enable_logging.then(|| {
        try_initialize_logging_global(tracing_core::LevelFilter::DEBUG).ok();
        // % is Display, ? is Debug.
        tracing::debug!(message = "Start logging...", cli_arg = ?cli_arg);
    });

    let report = run_command(&cli_arg.command, cli_arg.global_options.loop_flags())?;
    println!("{report}");

    enable_logging.then(|| {
        tracing::debug!(message = "Stop logging...", %report);
    });

    Ok(())
}

// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Installs a graphical [miette](https://docs.rs/miette/latest/miette/index.html) report
//! handler for binaries that return `miette::Result<()>` from `main()`.
//!
//! The [`miette::ErrorHook`] is lazy: it only runs when a report is actually displayed,
//! so the terminal width is measured just before the error is printed, and never if no
//! error occurs.

use miette::MietteHandlerOpts;
use tracing::debug;

/// Width used when stdout is not a terminal.
pub const DEFAULT_REPORT_WIDTH: usize = 80;

/// Registers the global report handler. Calling it more than once is harmless, the
/// second registration is ignored.
pub fn setup_default_miette_global_report_handler(issues_url: &'static str) {
    miette::set_hook(Box::new(move |_report| {
        let terminal_width = {
            let it = rustix::termios::tcgetwinsize(std::io::stdout())
                .map_or(DEFAULT_REPORT_WIDTH, |winsize| usize::from(winsize.ws_col));
            debug!("miette::set_hook -> terminal_width: {}", it);
            it
        };
        Box::new(
            MietteHandlerOpts::new()
                .width(terminal_width)
                .wrap_lines(true)
                .unicode(true)
                .context_lines(3)
                .tab_width(4)
                .break_words(true)
                .with_cause_chain()
                .footer(issues_url.to_string())
                .build(),
        )
    }))
    .ok();
}

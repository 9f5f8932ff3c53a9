// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Command line configuration and scenarios for the `evloop` binary.

// Attach sources.
pub mod clap_config;
pub mod scenarios;

// Re-export.
pub use clap_config::*;
pub use scenarios::*;

// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::path::PathBuf;

/// Creates a file appender that never rolls over, writing to `path_str`.
///
/// Note that if you wrap this up in a non blocking writer, the guard has to be kept
/// alive for as long as logging is needed, so this returns the blocking appender.
///
/// # Errors
///
/// Returns an error if:
/// - The path has no parent directory
/// - The path has no file name
pub fn try_create(
    path_str: &str,
) -> miette::Result<tracing_appender::rolling::RollingFileAppender> {
    let path = PathBuf::from(&path_str);

    let parent = path.parent().ok_or_else(|| {
        miette::miette!(
            "Can't access the parent folder of {}. It might not exist, or you don't have \
             the required permissions.",
            path.display()
        )
    })?;

    let file_name = path.file_name().ok_or_else(|| {
        miette::miette!("{} does not name a log file.", path.display())
    })?;

    Ok(tracing_appender::rolling::never(parent, file_name))
}

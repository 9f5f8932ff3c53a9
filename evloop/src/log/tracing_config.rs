// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use tracing_core::LevelFilter;

/// Default log file, relative to the current directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "evloop_log.txt";

/// Configure where logs go and how verbose they are. Pass it (or anything that converts
/// into it) to [`try_initialize_logging_global()`].
///
/// ```no_run
/// use r3bl_evloop::{DisplayPreference, TracingConfig, WriterConfig};
///
/// let to_stderr: TracingConfig = DisplayPreference::Stderr.into();
/// let to_file: TracingConfig = WriterConfig::File("ev.log".to_string()).into();
/// let only_warnings: TracingConfig = tracing_core::LevelFilter::WARN.into();
/// ```
///
/// [`try_initialize_logging_global()`]: crate::try_initialize_logging_global
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub writer_config: WriterConfig,
    pub level_filter: LevelFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterConfig {
    None,
    Display(DisplayPreference),
    File(String /* log file path */),
    DisplayAndFile(DisplayPreference, String /* log file path */),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPreference {
    Stdout,
    Stderr,
}

impl TracingConfig {
    #[must_use]
    pub fn get_writer_config(&self) -> WriterConfig { self.writer_config.clone() }

    #[must_use]
    pub fn get_level_filter(&self) -> LevelFilter { self.level_filter }
}

impl Default for TracingConfig {
    /// Logging is off unless asked for.
    fn default() -> Self {
        Self {
            writer_config: WriterConfig::None,
            level_filter: LevelFilter::OFF,
        }
    }
}

impl From<tracing::Level> for TracingConfig {
    fn from(level: tracing::Level) -> Self {
        Self {
            writer_config: WriterConfig::File(DEFAULT_LOG_FILE_NAME.to_string()),
            level_filter: level.into(),
        }
    }
}

impl From<LevelFilter> for TracingConfig {
    fn from(level_filter: LevelFilter) -> Self {
        Self {
            writer_config: WriterConfig::File(DEFAULT_LOG_FILE_NAME.to_string()),
            level_filter,
        }
    }
}

impl From<DisplayPreference> for TracingConfig {
    fn from(preferred_display: DisplayPreference) -> Self {
        Self {
            writer_config: WriterConfig::Display(preferred_display),
            level_filter: LevelFilter::DEBUG,
        }
    }
}

impl From<WriterConfig> for TracingConfig {
    fn from(writer_config: WriterConfig) -> Self {
        Self {
            writer_config,
            level_filter: LevelFilter::DEBUG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_is_off() {
        let it = TracingConfig::default();
        assert_eq!(it.get_level_filter(), LevelFilter::OFF);
        assert_eq!(it.get_writer_config(), WriterConfig::None);
    }

    #[test]
    fn conversions_pick_sensible_defaults() {
        let it: TracingConfig = tracing::Level::INFO.into();
        assert_eq!(it.get_level_filter(), LevelFilter::INFO);
        assert_eq!(
            it.get_writer_config(),
            WriterConfig::File(DEFAULT_LOG_FILE_NAME.to_string())
        );

        let it: TracingConfig = DisplayPreference::Stderr.into();
        assert_eq!(it.get_level_filter(), LevelFilter::DEBUG);
        assert_eq!(
            it.get_writer_config(),
            WriterConfig::Display(DisplayPreference::Stderr)
        );
    }
}

//! Bridge from `tickbridge_config::Config` to telemetry types.

use tickbridge_config::Config;
use tickbridge_telemetry::{LogConfig, LogFormat};

/// Build the logging setup described by `[logging]`.
///
/// An unknown format falls back to compact; validation rejects those
/// before this point for loaded configs. Setting `directory` switches the
/// output from stderr to daily-rotated files.
#[must_use]
pub fn to_log_config(config: &Config) -> LogConfig {
    let format = config
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();
    let mut log = LogConfig::new(config.logging.level.clone()).with_format(format);
    for directive in &config.logging.directives {
        log = log.with_directive(directive.clone());
    }
    if let Some(dir) = &config.logging.directory {
        log = log.with_file_logging(dir);
    }
    log
}

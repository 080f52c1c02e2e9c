//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, WorkerMode};

/// Upper bound on pool threads.
pub const MAX_POOL_SIZE: usize = 256;

/// Upper bound on calls waiting for a pool thread.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_workers(config)?;
    validate_runtime(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_workers(config: &Config) -> ConfigResult<()> {
    let w = &config.workers;

    // Detached mode never reads these, so a zero there is harmless.
    if w.mode == WorkerMode::Detached {
        return Ok(());
    }

    if w.size == 0 || w.size > MAX_POOL_SIZE {
        return Err(invalid(
            "workers.size",
            format!("must be between 1 and {MAX_POOL_SIZE}, got {}", w.size),
        ));
    }

    if w.queue_capacity == 0 || w.queue_capacity > MAX_QUEUE_CAPACITY {
        return Err(invalid(
            "workers.queue_capacity",
            format!(
                "must be between 1 and {MAX_QUEUE_CAPACITY}, got {}",
                w.queue_capacity
            ),
        ));
    }

    Ok(())
}

fn validate_runtime(config: &Config) -> ConfigResult<()> {
    let r = &config.runtime;

    if r.max_memory_bytes == 0 {
        return Err(invalid("runtime.max_memory_bytes", "must be non-zero"));
    }

    if r.max_execution_secs == 0 {
        return Err(invalid("runtime.max_execution_secs", "must be non-zero"));
    }

    if let Some(empty) = r.search_paths.iter().position(|p| p.as_os_str().is_empty()) {
        return Err(invalid(
            "runtime.search_paths",
            format!("entry {empty} is an empty path"),
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if l.level.trim().is_empty() {
        return Err(invalid("logging.level", "must not be empty"));
    }

    if !LOG_FORMATS.contains(&l.format.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: {}",
                l.format,
                LOG_FORMATS.join(", ")
            ),
        ));
    }

    if l.directory.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
        return Err(invalid("logging.directory", "must not be an empty path"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut config = Config::default();
        config.workers.size = 0;
        assert_eq!(field_of(validate(&config).unwrap_err()), "workers.size");
    }

    #[test]
    fn oversized_queue_is_rejected() {
        let mut config = Config::default();
        config.workers.queue_capacity = MAX_QUEUE_CAPACITY.saturating_add(1);
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "workers.queue_capacity"
        );
    }

    #[test]
    fn detached_mode_ignores_pool_limits() {
        let mut config = Config::default();
        config.workers.mode = WorkerMode::Detached;
        config.workers.size = 0;
        validate(&config).unwrap();
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = Config::default();
        config.runtime.max_execution_secs = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "runtime.max_execution_secs"
        );
    }

    #[test]
    fn empty_search_path_entry_is_rejected() {
        let mut config = Config::default();
        config.runtime.search_paths = vec![PathBuf::from("scripts"), PathBuf::new()];
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "runtime.search_paths"
        );
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(validate(&config).unwrap_err()), "logging.format");
    }

    #[test]
    fn empty_log_directory_is_rejected() {
        let mut config = Config::default();
        config.logging.directory = Some(PathBuf::new());
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "logging.directory"
        );

        config.logging.directory = Some(PathBuf::from("logs"));
        validate(&config).unwrap();
    }
}

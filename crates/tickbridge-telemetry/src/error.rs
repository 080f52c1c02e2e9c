//! Telemetry error types.

use thiserror::Error;

/// Errors raised while configuring the logging subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter or a directive could not be parsed.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    /// A global subscriber is already installed, or installing one failed.
    #[error("failed to install subscriber: {0}")]
    InitError(String),

    /// The log directory could not be prepared.
    #[error("log directory error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

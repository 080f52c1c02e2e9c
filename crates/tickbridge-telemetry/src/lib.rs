//! Logging setup for tickbridge.
//!
//! Every tickbridge crate logs through `tracing`; this crate installs the
//! subscriber that turns those events into lines on stderr, stdout, or
//! rotating files.
//!
//! # Example
//!
//! ```rust,no_run
//! use tickbridge_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), tickbridge_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("tickbridge_core=debug");
//! setup_logging(&config)?;
//! tracing::info!("host started");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};

//! Layered configuration for tickbridge.
//!
//! Precedence, highest first: explicit file, workspace `tickbridge.toml`,
//! user `~/.tickbridge/config.toml`, embedded defaults. `TICKBRIDGE_*`
//! environment variables fill only fields that no file set.
//!
//! ```rust,no_run
//! use tickbridge_config::{LoadOptions, load};
//!
//! # fn main() -> Result<(), tickbridge_config::ConfigError> {
//! let resolved = load(&LoadOptions {
//!     workspace_root: Some(std::env::current_dir().unwrap_or_default()),
//!     ..LoadOptions::default()
//! })?;
//! println!("pool size: {}", resolved.config.workers.size);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod env;
mod error;
mod loader;
mod types;
mod validate;

pub use env::{HOME_VAR, apply_env_fallbacks, collect_env_vars};
pub use error::{ConfigError, ConfigResult};
pub use loader::{LoadOptions, ResolvedConfig, WORKSPACE_FILE, from_toml_str, load, load_file};
pub use types::{
    Config, DeliverySection, DrainMode, LoggingSection, RuntimeSection, WorkerMode,
    WorkersSection,
};
pub use validate::{MAX_POOL_SIZE, MAX_QUEUE_CAPACITY, validate};

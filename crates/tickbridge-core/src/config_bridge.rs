//! Conversion from `tickbridge-config` types to bridge options.

use tickbridge_config::{Config, DrainMode, WorkerMode};

use crate::bridge::{Bridge, BridgeOptions};
use crate::delivery::DrainPolicy;
use crate::error::BridgeResult;
use crate::interpreter::Interpreter;
use crate::workers::WorkerStrategy;

impl From<&Config> for BridgeOptions {
    fn from(config: &Config) -> Self {
        let workers = match config.workers.mode {
            WorkerMode::Pool => WorkerStrategy::Pool {
                size: config.workers.size,
                queue_capacity: config.workers.queue_capacity,
            },
            WorkerMode::Detached => WorkerStrategy::Detached,
        };
        let drain = match config.delivery.drain {
            DrainMode::Blocking => DrainPolicy::Blocking,
            DrainMode::TryLock => DrainPolicy::TryLock,
        };
        Self {
            workers,
            drain,
            include_cwd: config.runtime.include_cwd,
            search_paths: config.runtime.search_paths.clone(),
        }
    }
}

impl<I: Interpreter> Bridge<I> {
    /// Validate `config` and start a bridge from it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`](crate::BridgeError::Config) for an
    /// invalid configuration, or a dispatch error if workers cannot start.
    pub fn from_config(interpreter: I, config: &Config) -> BridgeResult<Self> {
        tickbridge_config::validate(config)?;
        Self::start(interpreter, BridgeOptions::from(config))
    }
}

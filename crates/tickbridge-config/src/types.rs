//! Configuration types.
//!
//! These types carry no dependency on the other tickbridge crates; the core
//! crate converts them into its own option types at start-up. Every struct
//! implements [`Default`] so a bare `[section]` header yields a working
//! configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How threaded calls are executed.
    pub workers: WorkersSection,
    /// How completed calls are drained on each tick.
    pub delivery: DeliverySection,
    /// Embedded runtime limits and module search path.
    pub runtime: RuntimeSection,
    /// Logging level, layout, and directives.
    pub logging: LoggingSection,
}

/// Execution strategy for threaded dispatches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// Fixed pool of long-lived workers fed by a bounded channel.
    #[default]
    Pool,
    /// One detached thread per call, no upper bound.
    Detached,
}

/// `[workers]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersSection {
    /// Strategy.
    pub mode: WorkerMode,
    /// Number of pool threads. Ignored in detached mode.
    pub size: usize,
    /// Calls that may wait for a free pool thread before dispatch is refused.
    pub queue_capacity: usize,
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            mode: WorkerMode::Pool,
            size: 4,
            queue_capacity: 256,
        }
    }
}

/// Locking policy used when draining the completion queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    /// Wait for the queue lock, then take everything.
    #[default]
    Blocking,
    /// Skip this tick if a worker holds the lock.
    TryLock,
}

/// `[delivery]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySection {
    /// Drain policy.
    pub drain: DrainMode,
}

/// `[runtime]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Directories searched for modules, in order.
    pub search_paths: Vec<PathBuf>,
    /// Append the process working directory to the search path on first call.
    pub include_cwd: bool,
    /// Linear memory cap per module, in bytes.
    pub max_memory_bytes: u64,
    /// Wall-clock limit per call, in seconds.
    pub max_execution_secs: u64,
    /// Give modules a WASI environment.
    pub wasi: bool,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            include_cwd: true,
            max_memory_bytes: 64 * 1024 * 1024,
            max_execution_secs: 30,
            wasi: true,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base filter level.
    pub level: String,
    /// `pretty`, `compact`, or `json`.
    pub format: String,
    /// Per-target filter directives, e.g. `tickbridge_core=debug`.
    pub directives: Vec<String>,
    /// Write daily-rotated log files here instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
            directory: None,
        }
    }
}

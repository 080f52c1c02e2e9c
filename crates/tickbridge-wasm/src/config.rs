//! Limits applied to every loaded module.

use std::time::Duration;

use tickbridge_config::RuntimeSection;

/// WASM page size in bytes.
const PAGE_SIZE: u64 = 64 * 1024;

/// Configuration for WASM execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmConfig {
    /// Maximum linear memory in bytes.
    pub max_memory_bytes: u64,
    /// Maximum wall-clock time per call.
    pub max_execution_time: Duration,
    /// Enable WASI.
    pub enable_wasi: bool,
}

impl WasmConfig {
    /// Memory cap in 64 KiB pages, saturating at `u32::MAX`.
    #[must_use]
    pub fn max_pages(&self) -> u32 {
        u32::try_from(self.max_memory_bytes / PAGE_SIZE).unwrap_or(u32::MAX)
    }
}

impl Default for WasmConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 64 * 1024 * 1024, // 64 MB
            max_execution_time: Duration::from_secs(30),
            enable_wasi: true,
        }
    }
}

impl From<&RuntimeSection> for WasmConfig {
    fn from(runtime: &RuntimeSection) -> Self {
        Self {
            max_memory_bytes: runtime.max_memory_bytes,
            max_execution_time: Duration::from_secs(runtime.max_execution_secs),
            enable_wasi: runtime.wasi,
        }
    }
}

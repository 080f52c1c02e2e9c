//! Extism-backed embedded runtime for tickbridge.
//!
//! A module named `tools.text` is the file `tools/text.wasm` in the first
//! search directory that has it. Its function exports are callable; any
//! other export kind resolves but is not callable. Each call passes the
//! string arguments as a JSON array and expects UTF-8 output.
//!
//! ```rust,no_run
//! use tickbridge_core::{Bridge, BridgeOptions, CallDescriptor};
//! use tickbridge_wasm::{WasmConfig, WasmInterpreter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = WasmInterpreter::new(WasmConfig::default()).with_search_dir("scripts");
//! let bridge = Bridge::start(runtime, BridgeOptions::default())?;
//! let text = bridge.dispatch_sync(CallDescriptor::new("tools.text", "upper").with_argument("hi"))?;
//! println!("{text}");
//! bridge.shutdown();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod interpreter;
mod module;

pub use config::WasmConfig;
pub use interpreter::{WasmInterpreter, WasmValue, decode_output, encode_arguments};
pub use module::{ExportKind, WasmModule, inspect_exports, load as load_module, relative_path};

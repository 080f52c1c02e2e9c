//! Shared test utilities for tickbridge.
//!
//! Mocks for both seams of the bridge (a scripted embedded runtime and a
//! recording host VM), WASM module fixtures, and a log capture helper for
//! asserting on reports emitted from worker threads.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tickbridge-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use tickbridge_core::{Bridge, BridgeOptions, CallDescriptor};
//! use tickbridge_test::{RecordingVm, calc_interpreter};
//!
//! let bridge = Bridge::start(calc_interpreter(), BridgeOptions::default()).unwrap();
//! let mut vm = RecordingVm::new("gamemode").with_callback("onResult");
//! bridge.dispatch_async(CallDescriptor::new("calc", "add_one")
//!     .with_callback("onResult")
//!     .with_argument("42")).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod logs;
pub mod mocks;

pub use fixtures::*;
pub use logs::*;
pub use mocks::*;

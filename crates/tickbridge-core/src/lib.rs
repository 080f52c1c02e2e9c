//! Asynchronous call bridge between a tick-polled host VM and an embedded
//! interpreter.
//!
//! A host VM that advances in discrete ticks cannot block and cannot be
//! called into from another thread. This crate lets it run functions in an
//! embedded runtime either inline or on a worker thread, and hands the
//! results back on the host's own thread at the next tick.
//!
//! # Data flow
//!
//! ```text
//! Bridge::dispatch_async ─▶ worker ─▶ Invoker (execution lock)
//!                                         │
//!                                         ▼
//!                                  CompletionQueue
//!                                         │
//! Bridge::tick(vm) ◀──────────────────────┘  push len, result, module; exec
//! ```
//!
//! The embedded runtime is any [`Interpreter`]; the host is any [`HostVm`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bridge;
mod call;
mod config_bridge;
mod delivery;
mod dispatcher;
mod error;
mod host;
mod interpreter;
mod invoker;
mod queue;
mod workers;

pub use bridge::{Bridge, BridgeOptions};
pub use call::{CallDescriptor, CallId, CompletedCall};
pub use delivery::{DeliveryReport, DrainPolicy, TickDelivery};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{
    BridgeError, BridgeResult, DeliveryError, DeliveryResult, DispatchError, DispatchResult,
    HostError, InvokeError, InvokeResult,
};
pub use host::HostVm;
pub use interpreter::{Interpreter, RuntimeFault, SearchPath};
pub use invoker::{ExecutionLock, Invoker};
pub use queue::CompletionQueue;
pub use workers::WorkerStrategy;

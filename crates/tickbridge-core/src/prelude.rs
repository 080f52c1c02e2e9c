//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tickbridge_core::prelude::*;` to import all essential types.

pub use crate::{Bridge, BridgeOptions, Dispatched, DrainPolicy, WorkerStrategy};
pub use crate::{CallDescriptor, CallId, CompletedCall};
pub use crate::{DeliveryReport, HostVm};
pub use crate::{Interpreter, RuntimeFault, SearchPath};
pub use crate::{
    BridgeError, BridgeResult, DeliveryError, DispatchError, HostError, InvokeError,
};

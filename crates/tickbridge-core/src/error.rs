//! Error types for the call bridge.

use std::io;

use thiserror::Error;
use tracing::error;

use crate::call::CallId;
use crate::interpreter::RuntimeFault;

/// A call could not be handed to a worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The OS refused to create a worker thread.
    #[error("failed to spawn worker thread: {source}")]
    SpawnFailed {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Every pool slot is busy and the hand-off queue is full.
    #[error("worker pool saturated ({capacity} calls already waiting)")]
    Saturated {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The bridge is shutting down.
    #[error("dispatcher is shut down")]
    ShutDown,
}

/// An invocation failed inside the embedded runtime.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The module could not be imported.
    #[error("module '{module}' not found")]
    ModuleNotFound {
        /// Requested module.
        module: String,
        /// Runtime detail, if any.
        #[source]
        fault: Option<RuntimeFault>,
    },

    /// The module has no attribute with the requested name.
    #[error("function '{function}' not found in module '{module}'")]
    AttributeNotFound {
        /// Module searched.
        module: String,
        /// Requested function.
        function: String,
        /// Runtime detail, if any.
        #[source]
        fault: Option<RuntimeFault>,
    },

    /// The attribute exists but cannot be invoked.
    #[error("'{module}.{function}' is not callable")]
    NotCallable {
        /// Module searched.
        module: String,
        /// Attribute found.
        function: String,
    },

    /// The callee raised.
    #[error("'{module}.{function}' raised {fault}")]
    InvocationRaised {
        /// Module called.
        module: String,
        /// Function called.
        function: String,
        /// What was raised.
        #[source]
        fault: RuntimeFault,
    },

    /// The return value has no text form.
    #[error("result of '{module}.{function}' is not string-convertible: {fault}")]
    ResultNotStringConvertible {
        /// Module called.
        module: String,
        /// Function called.
        function: String,
        /// Conversion failure.
        #[source]
        fault: RuntimeFault,
    },
}

impl InvokeError {
    /// Stable category name used in log fields.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::ModuleNotFound { .. } => "module_not_found",
            Self::AttributeNotFound { .. } => "attribute_not_found",
            Self::NotCallable { .. } => "not_callable",
            Self::InvocationRaised { .. } => "invocation_raised",
            Self::ResultNotStringConvertible { .. } => "result_not_string_convertible",
        }
    }

    /// The runtime fault behind this error, if one was captured.
    #[must_use]
    pub fn fault(&self) -> Option<&RuntimeFault> {
        match self {
            Self::ModuleNotFound { fault, .. } | Self::AttributeNotFound { fault, .. } => {
                fault.as_ref()
            },
            Self::InvocationRaised { fault, .. }
            | Self::ResultNotStringConvertible { fault, .. } => Some(fault),
            Self::NotCallable { .. } => None,
        }
    }

    /// Emit the structured error report for a failed call.
    pub fn report(&self, call_id: CallId) {
        let fault = self.fault();
        error!(
            call_id = %call_id,
            category = self.category(),
            fault_kind = fault.map(|f| f.category.as_str()),
            fault_message = fault.map(|f| f.message.as_str()),
            trace = fault.and_then(|f| f.trace.as_deref()),
            "call failed: {}",
            self
        );
    }
}

/// Error reported by a host VM while pushing arguments or executing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// An argument could not be pushed onto the VM stack.
    #[error("push failed: {0}")]
    Push(String),
    /// The callback could not be executed.
    #[error("exec failed: {0}")]
    Exec(String),
}

/// A completed call could not be delivered.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No VM defines the callback.
    #[error("callback '{callback}' not found in {vm}")]
    CallbackNotFound {
        /// VM (or VMs) searched.
        vm: String,
        /// Callback requested.
        callback: String,
    },

    /// The VM failed while running the callback.
    #[error("host error in {vm}: {source}")]
    Host {
        /// VM that failed.
        vm: String,
        /// Underlying host error.
        #[source]
        source: HostError,
    },
}

/// Bridge start-up failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Worker set-up failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] tickbridge_config::ConfigError),
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for invocations.
pub type InvokeResult<T> = Result<T, InvokeError>;

/// Result type for delivery operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Result type for bridge lifecycle operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

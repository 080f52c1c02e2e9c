//! Call descriptors.
//!
//! A call moves through three types: a pending [`CallDescriptor`] built by
//! the host, consumed by the invoker, and a [`CompletedCall`] that only a
//! successful invocation can construct. The completion queue accepts nothing
//! else, so a failed call can never be delivered.

use std::fmt;
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CallId
// ---------------------------------------------------------------------------

/// Unique identifier attached to a call for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Create a new random call ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return the inner [`Uuid`].
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CallDescriptor
// ---------------------------------------------------------------------------

/// A request to run `module.function(arguments..)` in the embedded runtime.
///
/// ```
/// use tickbridge_core::CallDescriptor;
///
/// let call = CallDescriptor::new("calc", "add_one")
///     .with_callback("onResult")
///     .with_arguments(["42"]);
/// assert_eq!(call.arguments(), ["42"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    id: CallId,
    module: String,
    function: String,
    callback: String,
    arguments: Vec<String>,
}

impl CallDescriptor {
    /// Create a fire-and-forget call with no arguments.
    #[must_use]
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            id: CallId::new(),
            module: module.into(),
            function: function.into(),
            callback: String::new(),
            arguments: Vec::new(),
        }
    }

    /// Name the host function that receives the result.
    #[must_use]
    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = callback.into();
        self
    }

    /// Replace the positional arguments.
    #[must_use]
    pub fn with_arguments<A, S>(mut self, arguments: A) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Append one positional argument.
    #[must_use]
    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Call ID.
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Module name.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Function name.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Callback name; empty for fire-and-forget calls.
    #[must_use]
    pub fn callback(&self) -> &str {
        &self.callback
    }

    /// Positional arguments, in call order.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Whether the result is discarded instead of delivered.
    #[must_use]
    pub fn is_fire_and_forget(&self) -> bool {
        self.callback.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CompletedCall
// ---------------------------------------------------------------------------

/// A call whose invocation succeeded, waiting for delivery.
///
/// Not `Clone`: each result is queued once and delivered at most once.
///
/// ```compile_fail
/// fn queued_twice<T: Clone>() {}
/// queued_twice::<tickbridge_core::CompletedCall>();
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct CompletedCall {
    descriptor: CallDescriptor,
    result: String,
    origin: ThreadId,
}

impl CompletedCall {
    /// Stamp a successful result with the current thread.
    pub(crate) fn new(descriptor: CallDescriptor, result: String) -> Self {
        Self {
            descriptor,
            result,
            origin: thread::current().id(),
        }
    }

    /// The descriptor that produced this result.
    #[must_use]
    pub fn descriptor(&self) -> &CallDescriptor {
        &self.descriptor
    }

    /// Call ID.
    #[must_use]
    pub fn id(&self) -> CallId {
        self.descriptor.id
    }

    /// Module name.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.descriptor.module
    }

    /// Callback name.
    #[must_use]
    pub fn callback(&self) -> &str {
        &self.descriptor.callback
    }

    /// Text result of the invocation.
    #[must_use]
    pub fn result(&self) -> &str {
        &self.result
    }

    /// Thread that ran the invocation. Diagnostic only.
    #[must_use]
    pub fn origin(&self) -> ThreadId {
        self.origin
    }

    /// Consume the call, keeping only the result.
    #[must_use]
    pub fn into_result(self) -> String {
        self.result
    }
}

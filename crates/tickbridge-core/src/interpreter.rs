//! The embedded runtime seam.
//!
//! The bridge never talks to a concrete runtime. It drives an
//! [`Interpreter`] through the fixed sequence import, resolve, convert,
//! call, stringify, always under the execution lock.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// A failure raised inside the embedded runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}: {message}")]
pub struct RuntimeFault {
    /// Runtime-specific error kind, e.g. `ModuleNotFoundError`.
    pub category: String,
    /// Human-readable message.
    pub message: String,
    /// Formatted backtrace, when the runtime provides one.
    pub trace: Option<String>,
}

impl RuntimeFault {
    /// Create a fault without a trace.
    #[must_use]
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
            trace: None,
        }
    }

    /// Attach a trace.
    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

/// Ordered, duplicate-free list of directories searched for modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Create an empty search path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `dir` unless it is already present. Returns `true` if added.
    pub fn ensure(&mut self, dir: impl Into<PathBuf>) -> bool {
        let dir = dir.into();
        if self.contains(&dir) {
            return false;
        }
        self.dirs.push(dir);
        true
    }

    /// Whether `dir` is on the path.
    #[must_use]
    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.iter().any(|d| d == dir)
    }

    /// Directories in search order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }

    /// Number of directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Whether the path is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for SearchPath {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self {
        let mut path = Self::new();
        for dir in iter {
            path.ensure(dir);
        }
        path
    }
}

/// An embedded runtime that can import modules and call their functions.
///
/// All methods are called with the execution lock held, so implementations
/// need not be internally synchronized.
pub trait Interpreter: Send + 'static {
    /// A loaded code unit.
    type Module;
    /// A runtime value: an attribute, an argument, or a call result.
    type Value;

    /// The module search path, mutated to add the working directory.
    fn search_path_mut(&mut self) -> &mut SearchPath;

    /// Load `module` by name.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeFault`] if the module cannot be found or loaded.
    fn import(&mut self, module: &str) -> Result<Self::Module, RuntimeFault>;

    /// Look up an attribute. `Ok(None)` means the module has no such name.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeFault`] if the lookup itself fails.
    fn attribute(
        &mut self,
        module: &Self::Module,
        name: &str,
    ) -> Result<Option<Self::Value>, RuntimeFault>;

    /// Whether `value` can be invoked.
    fn is_callable(&self, value: &Self::Value) -> bool;

    /// Convert a host string argument into a runtime value.
    fn argument(&mut self, text: &str) -> Self::Value;

    /// Invoke `callable` with exactly `args` as positional arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeFault`] if the callee raises.
    fn call(
        &mut self,
        callable: &Self::Value,
        args: &[Self::Value],
    ) -> Result<Self::Value, RuntimeFault>;

    /// Render a result as text.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeFault`] if the value has no text form.
    fn to_text(&mut self, value: &Self::Value) -> Result<String, RuntimeFault>;

    /// Release runtime resources. Called once, at bridge shutdown.
    fn finalize(&mut self) {}
}

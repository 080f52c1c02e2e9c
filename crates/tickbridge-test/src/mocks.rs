//! Mock implementations for testing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tickbridge_core::{HostError, HostVm, Interpreter, RuntimeFault, SearchPath};

/// Body of a scripted function: string arguments in, value or fault out.
pub type ScriptFn = Arc<dyn Fn(&[String]) -> Result<ScriptValue, RuntimeFault> + Send + Sync>;

/// A value in the scripted runtime.
#[derive(Clone)]
pub enum ScriptValue {
    /// Text.
    Text(String),
    /// Integer; converts to decimal text.
    Int(i64),
    /// A value with no text form.
    Opaque(String),
    /// A callable.
    Function(ScriptFn),
}

impl ScriptValue {
    /// Text value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Self::Opaque(o) => f.debug_tuple("Opaque").field(o).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A named set of scripted attributes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModule {
    attributes: HashMap<String, ScriptValue>,
}

impl ScriptedModule {
    /// Create an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callable attribute.
    #[must_use]
    pub fn function<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&[String]) -> Result<ScriptValue, RuntimeFault> + Send + Sync + 'static,
    {
        self.attributes
            .insert(name.to_owned(), ScriptValue::Function(Arc::new(body)));
        self
    }

    /// Add a non-callable attribute.
    #[must_use]
    pub fn constant(mut self, name: &str, value: ScriptValue) -> Self {
        self.attributes.insert(name.to_owned(), value);
        self
    }
}

/// Counters shared between a [`ScriptedInterpreter`] and the test.
#[derive(Debug, Default)]
pub struct InterpreterStats {
    imports: AtomicUsize,
    calls: AtomicUsize,
    finalized: AtomicUsize,
}

impl InterpreterStats {
    /// Successful and failed imports.
    #[must_use]
    pub fn imports(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }

    /// Function invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `finalize` calls.
    #[must_use]
    pub fn finalized(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }
}

/// In-memory [`Interpreter`] whose modules are Rust closures.
#[derive(Debug, Default)]
pub struct ScriptedInterpreter {
    search: SearchPath,
    modules: HashMap<String, Arc<ScriptedModule>>,
    stats: Arc<InterpreterStats>,
}

impl ScriptedInterpreter {
    /// Create an interpreter with no modules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module.
    #[must_use]
    pub fn with_module(mut self, name: &str, module: ScriptedModule) -> Self {
        self.modules.insert(name.to_owned(), Arc::new(module));
        self
    }

    /// Counters that stay readable after the interpreter is moved away.
    #[must_use]
    pub fn stats(&self) -> Arc<InterpreterStats> {
        Arc::clone(&self.stats)
    }

    /// The current search path.
    #[must_use]
    pub fn search_path(&self) -> &SearchPath {
        &self.search
    }
}

impl Interpreter for ScriptedInterpreter {
    type Module = Arc<ScriptedModule>;
    type Value = ScriptValue;

    fn search_path_mut(&mut self) -> &mut SearchPath {
        &mut self.search
    }

    fn import(&mut self, module: &str) -> Result<Arc<ScriptedModule>, RuntimeFault> {
        self.stats.imports.fetch_add(1, Ordering::SeqCst);
        self.modules.get(module).cloned().ok_or_else(|| {
            RuntimeFault::new("ModuleNotFoundError", format!("No module named '{module}'"))
        })
    }

    fn attribute(
        &mut self,
        module: &Arc<ScriptedModule>,
        name: &str,
    ) -> Result<Option<ScriptValue>, RuntimeFault> {
        Ok(module.attributes.get(name).cloned())
    }

    fn is_callable(&self, value: &ScriptValue) -> bool {
        matches!(value, ScriptValue::Function(_))
    }

    fn argument(&mut self, text: &str) -> ScriptValue {
        ScriptValue::text(text)
    }

    fn call(
        &mut self,
        callable: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, RuntimeFault> {
        let ScriptValue::Function(body) = callable else {
            return Err(RuntimeFault::new("TypeError", "object is not callable"));
        };
        self.stats.calls.fetch_add(1, Ordering::SeqCst);

        let texts = args
            .iter()
            .map(|arg| match arg {
                ScriptValue::Text(t) => Ok(t.clone()),
                ScriptValue::Int(n) => Ok(n.to_string()),
                other => Err(RuntimeFault::new(
                    "TypeError",
                    format!("unsupported argument {other:?}"),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        body(&texts)
    }

    fn to_text(&mut self, value: &ScriptValue) -> Result<String, RuntimeFault> {
        match value {
            ScriptValue::Text(t) => Ok(t.clone()),
            ScriptValue::Int(n) => Ok(n.to_string()),
            ScriptValue::Opaque(what) => Err(RuntimeFault::new(
                "TypeError",
                format!("{what} object has no string form"),
            )),
            ScriptValue::Function(_) => Err(RuntimeFault::new(
                "TypeError",
                "function object has no string form",
            )),
        }
    }

    fn finalize(&mut self) {
        self.stats.finalized.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Host VM
// ---------------------------------------------------------------------------

/// One callback execution observed by a [`RecordingVm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Callback name.
    pub callback: String,
    /// First parameter.
    pub module: String,
    /// Second parameter.
    pub result: String,
    /// Third parameter.
    pub result_len: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cell {
    Int(i32),
    Str(String),
}

/// Host VM that records callback executions.
///
/// Its callbacks take `(module[], result[], result_len)`; the stack is
/// popped in that order, so arguments pushed in any other order fail
/// `exec`.
#[derive(Debug, Clone)]
pub struct RecordingVm {
    name: String,
    publics: Vec<String>,
    stack: Vec<Cell>,
    invocations: Vec<Invocation>,
    return_code: i32,
    fail_exec: bool,
    releases: usize,
}

impl RecordingVm {
    /// Create a VM with no public functions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            publics: Vec::new(),
            stack: Vec::new(),
            invocations: Vec::new(),
            return_code: 0,
            fail_exec: false,
            releases: 0,
        }
    }

    /// Define a public function.
    #[must_use]
    pub fn with_callback(mut self, name: impl Into<String>) -> Self {
        self.publics.push(name.into());
        self
    }

    /// Make every callback return `code`.
    #[must_use]
    pub fn returning(mut self, code: i32) -> Self {
        self.return_code = code;
        self
    }

    /// Make every `exec` fail.
    #[must_use]
    pub fn failing_exec(mut self) -> Self {
        self.fail_exec = true;
        self
    }

    /// Executions so far, oldest first.
    #[must_use]
    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Times the VM was asked to free pushed arguments.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases
    }

    fn pop_str(&mut self) -> Result<String, HostError> {
        match self.stack.pop() {
            Some(Cell::Str(s)) => Ok(s),
            other => Err(HostError::Exec(format!("expected string, found {other:?}"))),
        }
    }
}

impl HostVm for RecordingVm {
    type Callback = usize;

    fn name(&self) -> &str {
        &self.name
    }

    fn find_callback(&self, name: &str) -> Option<usize> {
        self.publics.iter().position(|p| p == name)
    }

    fn push_int(&mut self, value: i32) -> Result<(), HostError> {
        self.stack.push(Cell::Int(value));
        Ok(())
    }

    fn push_str(&mut self, value: &str) -> Result<(), HostError> {
        self.stack.push(Cell::Str(value.to_owned()));
        Ok(())
    }

    fn exec(&mut self, callback: usize) -> Result<i32, HostError> {
        if self.fail_exec {
            return Err(HostError::Exec("abort".to_owned()));
        }
        let name = self
            .publics
            .get(callback)
            .cloned()
            .ok_or_else(|| HostError::Exec(format!("no public function at index {callback}")))?;

        let module = self.pop_str()?;
        let result = self.pop_str()?;
        let result_len = match self.stack.pop() {
            Some(Cell::Int(n)) => n,
            other => return Err(HostError::Exec(format!("expected int, found {other:?}"))),
        };
        if !self.stack.is_empty() {
            return Err(HostError::Exec("too many arguments".to_owned()));
        }

        self.invocations.push(Invocation {
            callback: name,
            module,
            result,
            result_len,
        });
        Ok(self.return_code)
    }

    fn release(&mut self) {
        self.stack.clear();
        self.releases = self.releases.saturating_add(1);
    }
}

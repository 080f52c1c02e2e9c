//! Runs one call inside the embedded runtime.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::call::{CallDescriptor, CompletedCall};
use crate::error::{InvokeError, InvokeResult};
use crate::interpreter::Interpreter;

/// The global lock serializing every entry into the embedded runtime.
///
/// Waiters are not served in FIFO order.
#[derive(Debug)]
pub struct ExecutionLock<I> {
    interpreter: Mutex<I>,
}

impl<I: Interpreter> ExecutionLock<I> {
    /// Wrap an interpreter.
    #[must_use]
    pub fn new(interpreter: I) -> Self {
        Self {
            interpreter: Mutex::new(interpreter),
        }
    }

    /// Block until the runtime is free. A panic inside a previous call does
    /// not make the runtime unusable.
    pub fn acquire(&self) -> MutexGuard<'_, I> {
        self.interpreter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves and calls `module.function` under the execution lock.
///
/// Cloning is cheap; every clone shares the same lock.
#[derive(Debug)]
pub struct Invoker<I> {
    lock: Arc<ExecutionLock<I>>,
    include_cwd: bool,
}

impl<I> Clone for Invoker<I> {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            include_cwd: self.include_cwd,
        }
    }
}

impl<I: Interpreter> Invoker<I> {
    /// Create an invoker owning `interpreter`.
    #[must_use]
    pub fn new(interpreter: I) -> Self {
        Self {
            lock: Arc::new(ExecutionLock::new(interpreter)),
            include_cwd: true,
        }
    }

    /// Toggle adding the working directory to the search path on each call.
    #[must_use]
    pub fn with_include_cwd(mut self, include_cwd: bool) -> Self {
        self.include_cwd = include_cwd;
        self
    }

    /// The shared execution lock.
    #[must_use]
    pub fn lock(&self) -> &ExecutionLock<I> {
        &self.lock
    }

    /// Run `call`. On failure the structured report has already been
    /// logged when this returns.
    ///
    /// # Errors
    ///
    /// Returns an [`InvokeError`] describing which step failed.
    pub fn invoke(&self, call: CallDescriptor) -> InvokeResult<CompletedCall> {
        let id = call.id();
        match self.run(&call) {
            Ok(result) => Ok(CompletedCall::new(call, result)),
            Err(err) => {
                err.report(id);
                Err(err)
            },
        }
    }

    /// Call [`Interpreter::finalize`] under the lock.
    pub fn finalize(&self) {
        self.lock.acquire().finalize();
    }

    fn run(&self, call: &CallDescriptor) -> InvokeResult<String> {
        let mut interp = self.lock.acquire();
        debug!(
            call_id = %call.id(),
            module = call.module(),
            function = call.function(),
            args = call.arguments().len(),
            "execution lock acquired"
        );

        if self.include_cwd {
            if let Some(cwd) = current_dir() {
                if interp.search_path_mut().ensure(cwd.clone()) {
                    debug!(dir = %cwd.display(), "added working directory to search path");
                }
            }
        }

        let module = interp
            .import(call.module())
            .map_err(|fault| InvokeError::ModuleNotFound {
                module: call.module().to_owned(),
                fault: Some(fault),
            })?;

        let callable = interp
            .attribute(&module, call.function())
            .map_err(Some)
            .and_then(|found| found.ok_or(None))
            .map_err(|fault| InvokeError::AttributeNotFound {
                module: call.module().to_owned(),
                function: call.function().to_owned(),
                fault,
            })?;

        if !interp.is_callable(&callable) {
            return Err(InvokeError::NotCallable {
                module: call.module().to_owned(),
                function: call.function().to_owned(),
            });
        }

        let args: Vec<I::Value> = call
            .arguments()
            .iter()
            .map(|arg| interp.argument(arg))
            .collect();

        let value = interp
            .call(&callable, &args)
            .map_err(|fault| InvokeError::InvocationRaised {
                module: call.module().to_owned(),
                function: call.function().to_owned(),
                fault,
            })?;

        let text =
            interp
                .to_text(&value)
                .map_err(|fault| InvokeError::ResultNotStringConvertible {
                    module: call.module().to_owned(),
                    function: call.function().to_owned(),
                    fault,
                })?;

        debug!(call_id = %call.id(), result_len = text.len(), "call returned");
        Ok(text)
    }
}

fn current_dir() -> Option<PathBuf> {
    match std::env::current_dir() {
        Ok(dir) => Some(dir),
        Err(e) => {
            warn!(error = %e, "cannot read working directory; search path unchanged");
            None
        },
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::interpreter::{RuntimeFault, SearchPath};

    /// Modules map names to integer constants or to "add" functions.
    #[derive(Default)]
    struct TableInterpreter {
        search: SearchPath,
        modules: HashMap<String, HashMap<String, Entry>>,
        finalized: usize,
    }

    #[derive(Clone)]
    enum Entry {
        Constant(i64),
        AddTo(i64),
    }

    #[derive(Clone, Debug)]
    enum Val {
        Int(i64),
        Text(String),
        Fn(i64),
        Opaque,
    }

    impl Interpreter for TableInterpreter {
        type Module = HashMap<String, Entry>;
        type Value = Val;

        fn search_path_mut(&mut self) -> &mut SearchPath {
            &mut self.search
        }

        fn import(&mut self, module: &str) -> Result<Self::Module, RuntimeFault> {
            self.modules.get(module).cloned().ok_or_else(|| {
                RuntimeFault::new("ModuleNotFoundError", format!("No module named '{module}'"))
            })
        }

        fn attribute(
            &mut self,
            module: &Self::Module,
            name: &str,
        ) -> Result<Option<Val>, RuntimeFault> {
            Ok(module.get(name).map(|e| match e {
                Entry::Constant(n) => Val::Int(*n),
                Entry::AddTo(n) => Val::Fn(*n),
            }))
        }

        fn is_callable(&self, value: &Val) -> bool {
            matches!(value, Val::Fn(_))
        }

        fn argument(&mut self, text: &str) -> Val {
            Val::Text(text.to_owned())
        }

        fn call(&mut self, callable: &Val, args: &[Val]) -> Result<Val, RuntimeFault> {
            let Val::Fn(base) = callable else {
                return Err(RuntimeFault::new("TypeError", "not callable"));
            };
            match args {
                [Val::Text(t)] if t == "opaque" => Ok(Val::Opaque),
                [Val::Text(t)] => t
                    .parse::<i64>()
                    .map(|n| Val::Int(n + base))
                    .map_err(|e| RuntimeFault::new("ValueError", e.to_string())),
                _ => Err(RuntimeFault::new("TypeError", "expected one argument")),
            }
        }

        fn to_text(&mut self, value: &Val) -> Result<String, RuntimeFault> {
            match value {
                Val::Int(n) => Ok(n.to_string()),
                Val::Text(t) => Ok(t.clone()),
                _ => Err(RuntimeFault::new("TypeError", "no text form")),
            }
        }

        fn finalize(&mut self) {
            self.finalized += 1;
        }
    }

    fn invoker() -> Invoker<TableInterpreter> {
        let mut interp = TableInterpreter::default();
        interp.modules.insert(
            "calc".to_owned(),
            HashMap::from([
                ("add_one".to_owned(), Entry::AddTo(1)),
                ("answer".to_owned(), Entry::Constant(42)),
            ]),
        );
        Invoker::new(interp)
    }

    #[test]
    fn successful_call_produces_completed_call() {
        let call = CallDescriptor::new("calc", "add_one")
            .with_callback("onResult")
            .with_argument("42");
        let done = invoker().invoke(call).unwrap();
        assert_eq!(done.result(), "43");
        assert_eq!(done.callback(), "onResult");
    }

    #[test]
    fn missing_module() {
        let err = invoker()
            .invoke(CallDescriptor::new("nosuchmodule", "f"))
            .unwrap_err();
        assert!(matches!(err, InvokeError::ModuleNotFound { ref module, .. } if module == "nosuchmodule"));
    }

    #[test]
    fn missing_attribute_has_no_fault() {
        let err = invoker()
            .invoke(CallDescriptor::new("calc", "nosuchfunc"))
            .unwrap_err();
        assert!(matches!(err, InvokeError::AttributeNotFound { fault: None, .. }));
    }

    #[test]
    fn constant_is_not_callable() {
        let err = invoker()
            .invoke(CallDescriptor::new("calc", "answer"))
            .unwrap_err();
        assert!(matches!(err, InvokeError::NotCallable { .. }));
    }

    #[test]
    fn raised_fault_is_kept() {
        let err = invoker()
            .invoke(CallDescriptor::new("calc", "add_one").with_argument("forty"))
            .unwrap_err();
        assert_eq!(err.fault().map(|f| f.category.as_str()), Some("ValueError"));
    }

    #[test]
    fn argument_count_is_passed_through() {
        let err = invoker()
            .invoke(CallDescriptor::new("calc", "add_one").with_arguments(["1", "2"]))
            .unwrap_err();
        assert!(matches!(err, InvokeError::InvocationRaised { .. }));
    }

    #[test]
    fn unprintable_result() {
        let err = invoker()
            .invoke(CallDescriptor::new("calc", "add_one").with_argument("opaque"))
            .unwrap_err();
        assert!(matches!(err, InvokeError::ResultNotStringConvertible { .. }));
    }

    #[test]
    fn working_directory_added_once() {
        let invoker = invoker();
        for _ in 0..3 {
            invoker
                .invoke(CallDescriptor::new("calc", "add_one").with_argument("1"))
                .unwrap();
        }
        let cwd = std::env::current_dir().unwrap();
        let interp = invoker.lock().acquire();
        assert_eq!(interp.search.len(), 1);
        assert!(interp.search.contains(&cwd));
    }

    #[test]
    fn working_directory_can_be_disabled() {
        let invoker = invoker().with_include_cwd(false);
        invoker
            .invoke(CallDescriptor::new("calc", "add_one").with_argument("1"))
            .unwrap();
        assert!(invoker.lock().acquire().search.is_empty());
    }

    #[test]
    fn finalize_reaches_interpreter() {
        let invoker = invoker();
        invoker.finalize();
        assert_eq!(invoker.lock().acquire().finalized, 1);
    }
}

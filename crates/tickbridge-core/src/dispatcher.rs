//! Inline and threaded call dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::call::{CallDescriptor, CallId};
use crate::error::{DispatchError, DispatchResult, InvokeResult};
use crate::interpreter::Interpreter;
use crate::invoker::Invoker;
use crate::queue::CompletionQueue;
use crate::workers::{WorkerStrategy, Workers};

/// Outcome of [`Dispatcher::dispatch`].
#[derive(Debug)]
pub enum Dispatched {
    /// The call ran on the caller's thread.
    Inline(InvokeResult<String>),
    /// The call was handed to a worker; its result arrives on a later tick.
    Queued(CallId),
}

/// Decrements the in-flight counter when a job ends, panics included.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Routes calls to the invoker, either directly or through a worker.
pub struct Dispatcher<I> {
    invoker: Invoker<I>,
    queue: Arc<CompletionQueue>,
    workers: Workers,
    in_flight: Arc<AtomicUsize>,
    accepting: AtomicBool,
}

impl<I: Interpreter> Dispatcher<I> {
    /// Start workers for `strategy`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SpawnFailed`] if a pool thread cannot be
    /// created.
    pub fn new(
        invoker: Invoker<I>,
        queue: Arc<CompletionQueue>,
        strategy: WorkerStrategy,
    ) -> DispatchResult<Self> {
        Ok(Self {
            invoker,
            queue,
            workers: Workers::start(strategy)?,
            in_flight: Arc::new(AtomicUsize::new(0)),
            accepting: AtomicBool::new(true),
        })
    }

    /// Run `call` on the calling thread. The queue is never touched.
    ///
    /// # Errors
    ///
    /// Returns the [`InvokeError`](crate::InvokeError) that was also logged.
    pub fn dispatch_sync(&self, call: CallDescriptor) -> InvokeResult<String> {
        debug!(
            call_id = %call.id(),
            module = call.module(),
            function = call.function(),
            "dispatching inline"
        );
        self.invoker.invoke(call).map(|done| done.into_result())
    }

    /// Hand `call` to a worker and return at once. On success the worker
    /// pushes exactly one completed call; on failure it pushes nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if no worker accepts the call.
    pub fn dispatch_async(&self, call: CallDescriptor) -> DispatchResult<CallId> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }

        let id = call.id();
        debug!(
            call_id = %id,
            module = call.module(),
            function = call.function(),
            callback = call.callback(),
            "dispatching to worker"
        );

        let guard = InFlightGuard::enter(&self.in_flight);
        let invoker = self.invoker.clone();
        let queue = Arc::clone(&self.queue);
        let job = Box::new(move || {
            let _guard = guard;
            // Failures are reported by the invoker and dropped here.
            if let Ok(done) = invoker.invoke(call) {
                queue.push(done);
            }
        });

        let label = id.as_uuid().simple().to_string();
        let label = label.get(..8).unwrap_or(&label);
        self.workers.submit(label, job).inspect_err(|e| {
            warn!(call_id = %id, error = %e, "dispatch refused");
        })?;
        Ok(id)
    }

    /// Dispatch inline or threaded.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] only for threaded dispatch; inline
    /// failures are carried inside [`Dispatched::Inline`].
    pub fn dispatch(&self, call: CallDescriptor, threaded: bool) -> DispatchResult<Dispatched> {
        if threaded {
            self.dispatch_async(call).map(Dispatched::Queued)
        } else {
            Ok(Dispatched::Inline(self.dispatch_sync(call)))
        }
    }

    /// Calls dispatched asynchronously that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether asynchronous dispatch is still accepted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// The queue completed calls are pushed to.
    #[must_use]
    pub fn queue(&self) -> &Arc<CompletionQueue> {
        &self.queue
    }

    /// Refuse new asynchronous calls, then wait for running ones.
    ///
    /// A `dispatch_async` racing with this either finishes its call before
    /// `shutdown` returns or fails with [`DispatchError::ShutDown`].
    pub fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            debug!(in_flight = self.in_flight(), "dispatcher shutting down");
        }
        self.workers.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{RuntimeFault, SearchPath};

    /// Every function echoes its arguments joined by commas; `slow` sleeps
    /// first. Module `bad` does not exist.
    #[derive(Default)]
    struct Echo {
        search: SearchPath,
    }

    impl Interpreter for Echo {
        type Module = ();
        type Value = String;

        fn search_path_mut(&mut self) -> &mut SearchPath {
            &mut self.search
        }

        fn import(&mut self, module: &str) -> Result<(), RuntimeFault> {
            if module == "bad" {
                Err(RuntimeFault::new("ModuleNotFoundError", module))
            } else {
                Ok(())
            }
        }

        fn attribute(&mut self, _module: &(), name: &str) -> Result<Option<String>, RuntimeFault> {
            Ok(Some(name.to_owned()))
        }

        fn is_callable(&self, _: &String) -> bool {
            true
        }

        fn argument(&mut self, text: &str) -> String {
            text.to_owned()
        }

        fn call(&mut self, function: &String, args: &[String]) -> Result<String, RuntimeFault> {
            if function == "slow" {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            Ok(args.join(","))
        }

        fn to_text(&mut self, value: &String) -> Result<String, RuntimeFault> {
            Ok(value.clone())
        }
    }

    fn dispatcher(strategy: WorkerStrategy) -> Dispatcher<Echo> {
        Dispatcher::new(
            Invoker::new(Echo::default()).with_include_cwd(false),
            Arc::new(CompletionQueue::new()),
            strategy,
        )
        .unwrap()
    }

    #[test]
    fn sync_returns_result_without_queueing() {
        let d = dispatcher(WorkerStrategy::default());
        let out = d
            .dispatch_sync(CallDescriptor::new("m", "f").with_arguments(["a", "b"]))
            .unwrap();
        assert_eq!(out, "a,b");
        assert!(d.queue().is_empty());
        d.shutdown();
    }

    #[test]
    fn async_success_queues_exactly_once() {
        let d = dispatcher(WorkerStrategy::default());
        let id = d
            .dispatch_async(CallDescriptor::new("m", "f").with_callback("cb").with_argument("x"))
            .unwrap();
        d.shutdown();

        let drained = d.queue().drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id(), id);
        assert_eq!(drained[0].result(), "x");
        assert_eq!(d.in_flight(), 0);
    }

    #[test]
    fn async_failure_queues_nothing() {
        let d = dispatcher(WorkerStrategy::Detached);
        d.dispatch_async(CallDescriptor::new("bad", "f").with_callback("cb"))
            .unwrap();
        d.shutdown();
        assert!(d.queue().is_empty());
        assert_eq!(d.in_flight(), 0);
    }

    #[test]
    fn dispatch_routes_by_flag() {
        let d = dispatcher(WorkerStrategy::default());
        assert!(matches!(
            d.dispatch(CallDescriptor::new("m", "f"), false).unwrap(),
            Dispatched::Inline(Ok(_))
        ));
        assert!(matches!(
            d.dispatch(CallDescriptor::new("m", "f"), true).unwrap(),
            Dispatched::Queued(_)
        ));
        d.shutdown();
    }

    #[test]
    fn async_after_shutdown_is_refused() {
        let d = dispatcher(WorkerStrategy::Detached);
        d.shutdown();
        assert!(!d.is_accepting());
        assert!(matches!(
            d.dispatch_async(CallDescriptor::new("m", "f")),
            Err(DispatchError::ShutDown)
        ));
        assert_eq!(d.in_flight(), 0);
    }

    #[test]
    fn detached_shutdown_waits_for_calls_dispatched_concurrently() {
        let d = Arc::new(dispatcher(WorkerStrategy::Detached));

        let host = {
            let d = Arc::clone(&d);
            std::thread::spawn(move || {
                for n in 0..50 {
                    let call = CallDescriptor::new("m", "slow")
                        .with_callback("cb")
                        .with_argument(n.to_string());
                    if d.dispatch_async(call).is_err() {
                        break;
                    }
                }
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(15));
        d.shutdown();
        let completed_at_shutdown = d.queue().len();

        host.join().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(d.queue().len(), completed_at_shutdown);
        assert_eq!(d.in_flight(), 0);
    }
}

//! The bridge facade: one interpreter, one queue, one set of workers.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::call::{CallDescriptor, CallId};
use crate::delivery::{DeliveryReport, DrainPolicy, TickDelivery};
use crate::dispatcher::{Dispatched, Dispatcher};
use crate::error::{BridgeResult, DispatchResult, InvokeResult};
use crate::host::HostVm;
use crate::interpreter::Interpreter;
use crate::invoker::Invoker;
use crate::queue::CompletionQueue;
use crate::workers::WorkerStrategy;

/// Start-up options for a [`Bridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// How threaded calls run.
    pub workers: WorkerStrategy,
    /// How each tick drains the queue.
    pub drain: DrainPolicy,
    /// Add the working directory to the search path on each call.
    pub include_cwd: bool,
    /// Directories added to the search path at start-up.
    pub search_paths: Vec<PathBuf>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            workers: WorkerStrategy::default(),
            drain: DrainPolicy::default(),
            include_cwd: true,
            search_paths: Vec::new(),
        }
    }
}

/// Owns the whole call path from dispatch to delivery.
///
/// ```ignore
/// let bridge = Bridge::start(interpreter, BridgeOptions::default())?;
/// bridge.dispatch_async(CallDescriptor::new("calc", "add_one")
///     .with_callback("onResult")
///     .with_argument("42"))?;
///
/// // Once per host tick:
/// bridge.tick(&mut vm);
///
/// bridge.shutdown();
/// ```
pub struct Bridge<I: Interpreter> {
    invoker: Invoker<I>,
    dispatcher: Dispatcher<I>,
    delivery: TickDelivery,
    closed: bool,
}

impl<I: Interpreter> Bridge<I> {
    /// Take ownership of `interpreter` and start workers.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Dispatch`](crate::BridgeError::Dispatch) if
    /// the worker pool cannot start.
    pub fn start(mut interpreter: I, options: BridgeOptions) -> BridgeResult<Self> {
        for dir in &options.search_paths {
            interpreter.search_path_mut().ensure(dir.clone());
        }

        let invoker = Invoker::new(interpreter).with_include_cwd(options.include_cwd);
        let queue = Arc::new(CompletionQueue::new());
        let dispatcher = Dispatcher::new(invoker.clone(), Arc::clone(&queue), options.workers)?;
        let delivery = TickDelivery::new(queue, options.drain);

        info!(
            version = env!("CARGO_PKG_VERSION"),
            workers = ?options.workers,
            drain = ?options.drain,
            search_paths = options.search_paths.len(),
            "tickbridge started"
        );

        Ok(Self {
            invoker,
            dispatcher,
            delivery,
            closed: false,
        })
    }

    /// Run a call on this thread and return its result.
    ///
    /// # Errors
    ///
    /// Returns the [`InvokeError`](crate::InvokeError) that was also logged.
    pub fn dispatch_sync(&self, call: CallDescriptor) -> InvokeResult<String> {
        self.dispatcher.dispatch_sync(call)
    }

    /// Queue a call on a worker. The result arrives through [`tick`](Self::tick).
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`](crate::DispatchError) if no worker
    /// accepts the call.
    pub fn dispatch_async(&self, call: CallDescriptor) -> DispatchResult<CallId> {
        self.dispatcher.dispatch_async(call)
    }

    /// Dispatch inline or threaded.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub fn dispatch(&self, call: CallDescriptor, threaded: bool) -> DispatchResult<Dispatched> {
        self.dispatcher.dispatch(call, threaded)
    }

    /// Deliver completed calls into `vm`. Call once per host tick.
    ///
    /// This drains the whole queue into the one VM. Results whose callback
    /// `vm` does not define are logged and dropped, so a host running
    /// several VMs must not call this once per VM: the first VM would take
    /// results meant for the others. Use [`Bridge::tick_all`] instead.
    pub fn tick<V: HostVm>(&self, vm: &mut V) -> DeliveryReport {
        self.delivery.deliver(vm)
    }

    /// Deliver completed calls, offering each to every VM.
    pub fn tick_all<V: HostVm>(&self, vms: &mut [V]) -> DeliveryReport {
        self.delivery.deliver_all(vms)
    }

    /// Calls dispatched asynchronously and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Results waiting for the next tick.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.delivery_queue().len()
    }

    /// Stop accepting calls, wait for workers, then finalize the runtime.
    ///
    /// Results still queued are dropped with the bridge.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn delivery_queue(&self) -> &CompletionQueue {
        self.dispatcher.queue()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.dispatcher.shutdown();
        self.invoker.finalize();
        info!(
            undelivered = self.delivery_queue().len(),
            "tickbridge stopped"
        );
    }
}

impl<I: Interpreter> Drop for Bridge<I> {
    fn drop(&mut self) {
        if !self.closed {
            debug!("bridge dropped without shutdown");
            self.close();
        }
    }
}

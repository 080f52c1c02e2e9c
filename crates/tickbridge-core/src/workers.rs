//! Threads that run asynchronous calls.
//!
//! Two strategies: a bounded pool of long-lived threads fed through a
//! `tokio::sync::mpsc` channel, or one detached thread per call.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info};

use crate::error::{DispatchError, DispatchResult};

/// A unit of work handed to a worker.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// How asynchronous calls are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStrategy {
    /// Fixed pool of `size` threads; at most `queue_capacity` calls wait.
    Pool {
        /// Worker thread count.
        size: usize,
        /// Calls that may wait for a free worker.
        queue_capacity: usize,
    },
    /// A new detached thread per call.
    Detached,
}

impl Default for WorkerStrategy {
    fn default() -> Self {
        Self::Pool {
            size: 4,
            queue_capacity: 256,
        }
    }
}

/// Running worker set.
pub(crate) enum Workers {
    Pool(WorkerPool),
    Detached(DetachedSpawner),
}

impl Workers {
    pub(crate) fn start(strategy: WorkerStrategy) -> DispatchResult<Self> {
        match strategy {
            WorkerStrategy::Pool {
                size,
                queue_capacity,
            } => WorkerPool::start(size, queue_capacity).map(Self::Pool),
            WorkerStrategy::Detached => Ok(Self::Detached(DetachedSpawner::default())),
        }
    }

    pub(crate) fn submit(&self, label: &str, job: Job) -> DispatchResult<()> {
        match self {
            Self::Pool(pool) => pool.submit(job),
            Self::Detached(spawner) => spawner.spawn(label, job),
        }
    }

    /// Stop accepting work and wait for running jobs to finish.
    pub(crate) fn shutdown(&self) {
        match self {
            Self::Pool(pool) => pool.shutdown(),
            Self::Detached(spawner) => spawner.join_all(),
        }
    }
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!(
            thread = thread::current().name().unwrap_or("unnamed"),
            "worker job panicked"
        );
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

pub(crate) struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl WorkerPool {
    fn start(size: usize, capacity: usize) -> DispatchResult<Self> {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let spawned = thread::Builder::new()
                .name(format!("tickbridge-worker-{index}"))
                .spawn(move || {
                    loop {
                        // Holding the receiver lock while waiting leaves the
                        // other idle workers parked on the mutex instead.
                        let next = receiver
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .blocking_recv();
                        match next {
                            Some(job) => run_job(job),
                            None => break,
                        }
                    }
                    debug!("worker exiting");
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    // Close the channel so already-started workers exit.
                    drop(sender);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(DispatchError::SpawnFailed { source });
                },
            }
        }

        info!(workers = size, queue_capacity = capacity, "worker pool started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            capacity,
        })
    }

    fn submit(&self, job: Job) -> DispatchResult<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(DispatchError::ShutDown);
        };
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::Saturated {
                capacity: self.capacity,
            },
            TrySendError::Closed(_) => DispatchError::ShutDown,
        })
    }

    fn shutdown(&self) {
        // Dropping the sender lets workers drain what is queued, then exit.
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread panicked outside a job");
            }
        }
        if count > 0 {
            info!(workers = count, "worker pool stopped");
        }
    }
}

// ---------------------------------------------------------------------------
// Detached
// ---------------------------------------------------------------------------

/// Spawns one thread per call.
///
/// `None` once shutdown has begun. Spawning happens under the same lock, so
/// no thread can start after `join_all` has taken the handles.
pub(crate) struct DetachedSpawner {
    handles: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl Default for DetachedSpawner {
    fn default() -> Self {
        Self {
            handles: Mutex::new(Some(Vec::new())),
        }
    }
}

impl DetachedSpawner {
    fn spawn(&self, label: &str, job: Job) -> DispatchResult<()> {
        let mut guard = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handles) = guard.as_mut() else {
            return Err(DispatchError::ShutDown);
        };

        let handle = thread::Builder::new()
            .name(format!("tickbridge-call-{label}"))
            .spawn(move || run_job(job))
            .map_err(|source| DispatchError::SpawnFailed { source })?;

        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    fn join_all(&self) {
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                error!("call thread panicked outside a job");
            }
        }
        if count > 0 {
            debug!(threads = count, "call threads joined");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use super::*;

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn pool_runs_every_job_before_shutdown_returns() {
        let workers = Workers::start(WorkerStrategy::Pool {
            size: 3,
            queue_capacity: 64,
        })
        .unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            workers.submit("t", counting_job(&counter)).unwrap();
        }
        workers.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn pool_reports_saturation() {
        let workers = Workers::start(WorkerStrategy::Pool {
            size: 1,
            queue_capacity: 1,
        })
        .unwrap();

        // Park the only worker until released.
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let (started_tx, started_rx) = std_mpsc::channel::<()>();
        workers
            .submit(
                "block",
                Box::new(move || {
                    started_tx.send(()).unwrap();
                    let _ = release_rx.recv();
                }),
            )
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        workers.submit("fills", Box::new(|| {})).unwrap();
        let err = workers.submit("overflow", Box::new(|| {})).unwrap_err();
        assert!(matches!(err, DispatchError::Saturated { capacity: 1 }));

        release_tx.send(()).unwrap();
        workers.shutdown();
    }

    #[test]
    fn pool_rejects_after_shutdown() {
        let workers = Workers::start(WorkerStrategy::default()).unwrap();
        workers.shutdown();
        let err = workers.submit("late", Box::new(|| {})).unwrap_err();
        assert!(matches!(err, DispatchError::ShutDown));
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let workers = Workers::start(WorkerStrategy::Pool {
            size: 1,
            queue_capacity: 8,
        })
        .unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        workers.submit("boom", Box::new(|| panic!("job failed"))).unwrap();
        workers.submit("after", counting_job(&counter)).unwrap();
        workers.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detached_threads_are_joined_on_shutdown() {
        let workers = Workers::start(WorkerStrategy::Detached).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..10 {
            workers.submit(&i.to_string(), counting_job(&counter)).unwrap();
        }
        workers.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn detached_rejects_after_shutdown() {
        let workers = Workers::start(WorkerStrategy::Detached).unwrap();
        workers.shutdown();
        let err = workers.submit("late", Box::new(|| {})).unwrap_err();
        assert!(matches!(err, DispatchError::ShutDown));
    }

    #[test]
    fn detached_shutdown_racing_submits_leaves_nothing_running() {
        let workers = Arc::new(Workers::start(WorkerStrategy::Detached).unwrap());
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let submitter = {
            let workers = Arc::clone(&workers);
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                for i in 0..50 {
                    let started = Arc::clone(&started);
                    let finished = Arc::clone(&finished);
                    let job: Job = Box::new(move || {
                        started.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        finished.fetch_add(1, Ordering::SeqCst);
                    });
                    if workers.submit(&i.to_string(), job).is_err() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };

        thread::sleep(Duration::from_millis(10));
        workers.shutdown();
        let started_at_shutdown = started.load(Ordering::SeqCst);
        assert_eq!(finished.load(Ordering::SeqCst), started_at_shutdown);

        submitter.join().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(started.load(Ordering::SeqCst), started_at_shutdown);
    }
}

//! The completion queue shared by workers and the polling thread.

use std::sync::{Mutex, PoisonError, TryLockError};

use tracing::{debug, trace};

use crate::call::CompletedCall;

/// Thread-safe LIFO buffer of completed calls.
///
/// Workers [`push`](Self::push); only the host polling thread drains. A drain
/// takes every entry in one critical section and yields them most recent
/// first.
#[derive(Debug, Default)]
pub struct CompletionQueue {
    entries: Mutex<Vec<CompletedCall>>,
}

impl CompletionQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a completed call.
    pub fn push(&self, call: CompletedCall) {
        let id = call.id();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(call);
        debug!(call_id = %id, pending = entries.len(), "call completed and queued");
    }

    /// Take every entry, most recent first. Blocks while a worker is pushing.
    #[must_use]
    pub fn drain_all(&self) -> Vec<CompletedCall> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut drained = std::mem::take(&mut *entries);
        drop(entries);
        drained.reverse();
        drained
    }

    /// Like [`drain_all`](Self::drain_all) but returns `None` instead of
    /// waiting when the lock is held.
    #[must_use]
    pub fn try_drain(&self) -> Option<Vec<CompletedCall>> {
        let mut entries = match self.entries.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                trace!("completion queue contended, skipping drain");
                return None;
            },
        };
        let mut drained = std::mem::take(&mut *entries);
        drop(entries);
        drained.reverse();
        Some(drained)
    }

    /// Number of calls waiting for delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::call::CallDescriptor;

    fn completed(result: &str) -> CompletedCall {
        CompletedCall::new(
            CallDescriptor::new("m", "f").with_callback("cb"),
            result.to_owned(),
        )
    }

    #[test]
    fn drain_is_lifo() {
        let queue = CompletionQueue::new();
        queue.push(completed("first"));
        queue.push(completed("second"));
        queue.push(completed("third"));

        let results: Vec<_> = queue
            .drain_all()
            .into_iter()
            .map(CompletedCall::into_result)
            .collect();
        assert_eq!(results, ["third", "second", "first"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_drain_returns_nothing() {
        let queue = CompletionQueue::new();
        assert!(queue.drain_all().is_empty());
        assert_eq!(queue.try_drain().map(|v| v.len()), Some(0));
    }

    #[test]
    fn try_drain_skips_when_locked() {
        let queue = CompletionQueue::new();
        queue.push(completed("x"));

        let guard = queue.entries.lock().unwrap();
        assert!(queue.try_drain().is_none());
        drop(guard);

        assert_eq!(queue.try_drain().map(|v| v.len()), Some(1));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let queue = Arc::new(CompletionQueue::new());
        queue.push(completed("kept"));

        let q = Arc::clone(&queue);
        let _ = thread::spawn(move || {
            let _guard = q.entries.lock().unwrap();
            panic!("worker died holding the queue");
        })
        .join();

        assert_eq!(queue.drain_all().len(), 1);
    }
}

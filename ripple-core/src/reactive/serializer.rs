//! Per-effect run serialization.
//!
//! Every effect owns an [`EffectLock`]. Each run is queued on it and only
//! starts once the previous run has released it, so an asynchronous effect
//! body never overlaps itself even while suspended.
//!
//! The lock is a `tokio::sync::Mutex`, which hands itself to waiters in the
//! order they started waiting. A run's queue position is fixed the first
//! time its future is polled, which the effect scheduler does immediately
//! when the run is requested.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

/// A strict FIFO single-slot lock for effect runs.
#[derive(Debug, Clone, Default)]
pub struct EffectLock {
    slot: Arc<Mutex<()>>,
    queued: Arc<AtomicUsize>,
}

impl EffectLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once every previously queued task has finished.
    ///
    /// The returned future must be polled for the task to take its place in
    /// the queue.
    pub fn run<F>(&self, task: F) -> impl Future<Output = F::Output> + Send + 'static
    where
        F: Future + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        self.queued.fetch_add(1, Ordering::AcqRel);
        let release = Release(Arc::clone(&self.queued));

        async move {
            let _release = release;
            let _guard = slot.lock_owned().await;
            task.await
        }
    }

    /// Whether a task currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Tasks handed to [`EffectLock::run`] that have not finished yet,
    /// including the one holding the lock.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

struct Release(Arc<AtomicUsize>);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

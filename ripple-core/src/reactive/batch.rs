//! Batching
//!
//! Without batching, every signal write notifies its dependents right away,
//! so an effect reading two signals that are both updated runs twice (and
//! the first run sees a half-updated state). Inside [`batch`] notifications
//! are queued instead; each affected effect runs once when the outermost
//! batch ends, in the order it was first triggered.

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::Runtime;

/// Run `f` with effect re-runs deferred until it returns.
///
/// Nested calls join the outer batch; only the outermost one flushes. The
/// flush also happens if `f` panics.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{batch, Effect, Signal};
/// use std::sync::{Arc, Mutex};
///
/// let a = Signal::new(1);
/// let b = Signal::new(1);
/// let log = Arc::new(Mutex::new(Vec::new()));
///
/// let _effect = Effect::new({
///     let (a, b, log) = (a.clone(), b.clone(), log.clone());
///     move |_| log.lock().unwrap().push(a.get().unwrap() + b.get().unwrap())
/// });
///
/// batch(|| {
///     a.set(2).unwrap();
///     b.set(3).unwrap();
/// });
///
/// assert_eq!(*log.lock().unwrap(), [2, 5]);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::enter_batch();

    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            if let Some(pending) = Runtime::exit_batch() {
                trace!(count = pending.len(), "flushing batch");
                for subscriber in pending {
                    subscriber.notify();
                }
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Check if currently inside a batch.
pub fn is_batching() -> bool {
    Runtime::is_batching()
}

/// Run `f` without tracking any signal reads it makes.
///
/// Inside an effect this is the closure form of `Signal::peek`.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

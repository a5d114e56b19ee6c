//! Subscriber types for the reactive system.
//!
//! A Subscriber is the callback a signal invokes when its value changes.
//! Effects register one per signal they read; external consumers (such as a
//! renderer) can register their own through `Signal::subscribe`.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use super::context::Observer;
use crate::error::panic_message;

/// Unique identifier for a subscriber.
///
/// Each effect gets one when created. Signals key their subscriber sets by
/// it, so an effect reading the same signal twice subscribes once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// A change callback registered on a signal.
///
/// Cloning is cheap; the callback is shared.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    notify: Arc<dyn Fn() + Send + Sync>,
}

impl Subscriber {
    /// Create a new subscriber with a fresh ID.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_id(SubscriberId::new(), notify)
    }

    /// Create a subscriber for an existing ID.
    pub fn with_id<F>(id: SubscriberId, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            notify: Arc::new(notify),
        }
    }

    /// The subscriber that re-runs `observer` when notified.
    pub(crate) fn from_observer(observer: Arc<dyn Observer>) -> Self {
        let id = observer.subscriber_id();
        Self::with_id(id, move || Arc::clone(&observer).notify())
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Notify the subscriber that one of its dependencies changed.
    ///
    /// A panicking callback is logged and does not reach the writer of the
    /// signal or the other subscribers.
    pub fn notify(&self) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (self.notify)())) {
            warn!(
                subscriber = %self.id,
                reason = %panic_message(payload),
                "subscriber callback panicked"
            );
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

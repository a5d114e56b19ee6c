//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which effects depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (an effect body), the
//!    signal registers that effect as a subscriber and the effect records
//!    the signal as a dependency.
//!
//! 2. When a signal is assigned a value different from the current one, all
//!    subscribers are notified, immediately or at the end of the current
//!    batch. Assigning an equal value does nothing.
//!
//! 3. Disposing a signal drops its subscribers. Every later access returns
//!    [`ReactiveError::Disposed`].
//!
//! # Memory Layout
//!
//! A `Signal<T>` is a handle around shared state:
//! - A unique ID
//! - The value behind a `RwLock`
//! - The subscriber set, keyed by subscriber ID
//!
//! Effects only keep weak references to the signals they read, so a signal
//! lives as long as some handle to it does.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::runtime::{AnyReactive, Dispose, ReactiveId, Runtime};
use super::subscriber::{Subscriber, SubscriberId};
use crate::error::{ReactiveError, ReactiveKind, Result};

/// Unique identifier for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signal#{}", self.0)
    }
}

/// The type-erased side of a signal that an effect needs to drop its
/// subscription.
pub(crate) trait Source: Send + Sync {
    fn remove_subscriber(&self, subscriber: SubscriberId);
}

type DisposeHook = Box<dyn FnOnce() + Send>;
type TrackHook = Arc<dyn Fn() + Send + Sync>;

struct SignalInner<T> {
    id: SignalId,
    name: Option<String>,
    value: RwLock<T>,
    subscribers: Mutex<IndexMap<SubscriberId, Subscriber>>,
    disposed: AtomicBool,
    on_dispose: Mutex<SmallVec<[DisposeHook; 1]>>,
    on_track: Mutex<Option<TrackHook>>,
}

impl<T> SignalInner<T> {
    fn check(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ReactiveError::disposed(
                ReactiveKind::Signal,
                self.name.as_deref(),
            ));
        }
        Ok(())
    }

    fn notify(&self) {
        let subscribers: Vec<Subscriber> = self.subscribers.lock().values().cloned().collect();
        trace!(signal = %self.id, count = subscribers.len(), "signal changed");
        Runtime::dispatch(subscribers);
    }
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync,
{
    fn remove_subscriber(&self, subscriber: SubscriberId) {
        let removed = self.subscribers.lock().shift_remove(&subscriber);
        drop(removed);
    }
}

impl<T> Dispose for SignalInner<T>
where
    T: Send + Sync,
{
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let subscribers = std::mem::take(&mut *self.subscribers.lock());
        drop(subscribers);
        let hooks = std::mem::take(&mut *self.on_dispose.lock());
        for hook in hooks {
            hook();
        }

        debug!(signal = %self.id, name = ?self.name, "signal disposed");
        Runtime::disposed(ReactiveId::Signal(self.id));
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get().unwrap(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5).unwrap();
/// assert_eq!(count.peek().unwrap(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::build(value, None)
    }

    /// Create a new signal with a debug name.
    pub fn named(value: T, name: impl Into<String>) -> Self {
        Self::build(value, Some(name.into()))
    }

    pub(crate) fn build(value: T, name: Option<String>) -> Self {
        let signal = Self {
            inner: Arc::new(SignalInner {
                id: SignalId::next(),
                name,
                value: RwLock::new(value),
                subscribers: Mutex::new(IndexMap::new()),
                disposed: AtomicBool::new(false),
                on_dispose: Mutex::new(SmallVec::new()),
                on_track: Mutex::new(None),
            }),
        };
        Runtime::signal_created(&signal.handle());
        signal
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Get the signal's debug name.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Get the current value.
    ///
    /// If called while an effect is running, this also subscribes that
    /// effect to the signal.
    pub fn get(&self) -> Result<T> {
        self.inner.check()?;
        self.track();
        Ok(self.inner.value.read().clone())
    }

    /// Run `f` on the current value, tracking it like [`Signal::get`].
    ///
    /// `f` sees a snapshot and may write to the signal itself.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let value = self.get()?;
        Ok(f(&value))
    }

    /// Get the current value without subscribing the running effect.
    pub fn peek(&self) -> Result<T> {
        self.inner.check()?;
        Ok(self.inner.value.read().clone())
    }

    /// Report the read to the track hooks and register the running effect,
    /// if any, as a dependent.
    fn track(&self) {
        Runtime::signal_tracked(|| self.handle());
        let hook = self.inner.on_track.lock().clone();
        if let Some(hook) = hook {
            hook();
        }

        let Some(observer) = ReactiveContext::current() else {
            return;
        };

        {
            let mut subscribers = self.inner.subscribers.lock();
            if !subscribers.contains_key(&observer.subscriber_id()) {
                let subscriber = Subscriber::from_observer(Arc::clone(&observer));
                subscribers.insert(subscriber.id(), subscriber);
            }
        }

        let source: Arc<dyn Source> = self.inner.clone();
        observer.track(self.inner.id, Arc::downgrade(&source));
    }

    /// Register a change callback under `id`.
    ///
    /// Registering the same ID again replaces the callback.
    pub fn subscribe<F>(&self, id: SubscriberId, notify: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.check()?;
        self.inner
            .subscribers
            .lock()
            .insert(id, Subscriber::with_id(id, notify));
        Ok(())
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.remove_subscriber(id);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Run `hook` once when the signal is disposed.
    pub fn on_dispose<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.on_dispose.lock().push(Box::new(hook));
    }

    /// Call `hook` on every tracked read of this signal, inside an effect or
    /// not. [`Signal::peek`] does not count. Replaces any previous hook.
    pub fn on_track<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.on_track.lock() = Some(Arc::new(hook));
    }

    /// Dispose the signal, dropping every subscriber.
    ///
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        Dispose::dispose(&*self.inner);
    }

    /// Check if the signal has been disposed.
    pub fn is_disposed(&self) -> bool {
        Dispose::is_disposed(&*self.inner)
    }

    /// A type-erased handle to this signal.
    pub fn handle(&self) -> AnyReactive {
        AnyReactive::new(
            ReactiveId::Signal(self.inner.id),
            self.inner.name.clone(),
            self.inner.clone(),
        )
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Set a new value and notify subscribers.
    ///
    /// Setting a value equal to the current one does nothing.
    pub fn set(&self, value: T) -> Result<()> {
        self.inner.check()?;
        {
            let mut current = self.inner.value.write();
            if *current == value {
                return Ok(());
            }
            *current = value;
        }

        self.inner.notify();
        Ok(())
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value. The read
    /// is not tracked.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        self.inner.check()?;
        let current = self.inner.value.read().clone();
        self.set(f(&current))
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Used by effects to hold their dependencies without keeping them alive.
pub(crate) type WeakSource = Weak<dyn Source>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

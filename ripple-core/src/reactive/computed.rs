//! Computed Implementation
//!
//! A Computed is a read-only signal whose value is derived from other
//! signals.
//!
//! # How Computed Values Work
//!
//! 1. On creation an internal effect runs the producer and writes the
//!    result into a backing signal.
//!
//! 2. The producer's reads are tracked like any effect body. When one of
//!    them changes, the effect runs the producer again and writes the new
//!    result. Writing an equal result is a no-op, so dependents of the
//!    computed only re-run when its value actually changed.
//!
//! 3. Reading the computed reads the backing signal. The producer is never
//!    invoked by a read, so repeated reads between changes are free.
//!
//! # Asynchronous Producers
//!
//! [`Computed::new_async`] takes a producer returning a future. The backing
//! signal holds `None` until the first production resolves. Every
//! recomputation cancels the token handed to the previous one, and a
//! production that finishes after being cancelled is discarded instead of
//! overwriting a newer value.

use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::effect::Effect;
use super::signal::{Signal, SignalId};
use super::subscriber::SubscriberId;
use crate::error::{ReactiveError, ReactiveKind, Result};

/// A derived value backed by a signal and an effect.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get().unwrap_or_default() * 2
/// })
/// .unwrap();
///
/// assert_eq!(doubled.get().unwrap(), 4);
/// count.set(5).unwrap();
/// assert_eq!(doubled.get().unwrap(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    signal: Signal<T>,
    effect: Effect,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed value from a synchronous producer.
    ///
    /// The producer runs once before this returns. If that first run fails
    /// there is no value to expose and an error is returned.
    pub fn new<F>(producer: F) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(None, producer)
    }

    /// Create a named computed value. The name is shared by the backing
    /// signal and the internal effect.
    pub fn named<F>(name: impl Into<String>, producer: F) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Some(name.into()), producer)
    }

    fn build<F>(name: Option<String>, producer: F) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let backing: Arc<OnceLock<Signal<T>>> = Arc::new(OnceLock::new());

        let body = {
            let backing = Arc::clone(&backing);
            let name = name.clone();
            move |_: &CancellationToken| -> Result<()> {
                let value = producer();
                match backing.get() {
                    Some(signal) => signal.set(value),
                    None => {
                        let _ = backing.set(Signal::build(value, name.clone()));
                        Ok(())
                    }
                }
            }
        };
        let effect = match &name {
            Some(name) => Effect::named(name.clone(), body),
            None => Effect::new(body),
        };

        match backing.get() {
            Some(signal) => Ok(Self {
                signal: signal.clone(),
                effect,
            }),
            None => {
                effect.dispose();
                Err(ReactiveError::EffectFailed {
                    name,
                    reason: "initial computation did not produce a value".to_owned(),
                })
            }
        }
    }

    /// Get the current value, tracking it like a signal read.
    pub fn get(&self) -> Result<T> {
        self.signal.get().map_err(as_computed)
    }

    /// Run `f` on the current value, tracking it like a signal read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.signal.with(f).map_err(as_computed)
    }

    /// Get the current value without subscribing the running effect.
    pub fn peek(&self) -> Result<T> {
        self.signal.peek().map_err(as_computed)
    }

    /// The backing signal's ID.
    pub fn id(&self) -> SignalId {
        self.signal.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.signal.name()
    }

    /// Register a change callback on the backing signal.
    pub fn subscribe<F>(&self, id: SubscriberId, notify: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.signal.subscribe(id, notify).map_err(as_computed)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.signal.unsubscribe(id);
    }

    /// How many times the producer has run.
    pub fn compute_count(&self) -> usize {
        self.effect.run_count()
    }

    /// Dispose the internal effect and the backing signal.
    pub fn dispose(&self) {
        self.effect.dispose();
        self.signal.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.signal.is_disposed()
    }
}

/// Report errors from the backing signal as coming from the computed.
fn as_computed(error: ReactiveError) -> ReactiveError {
    match error {
        ReactiveError::Disposed { name, .. } => ReactiveError::Disposed {
            kind: ReactiveKind::Computed,
            name,
        },
        other => other,
    }
}

impl<T> Computed<Option<T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed value from an asynchronous producer.
    ///
    /// Must be called from within a Tokio runtime. The value is `None`
    /// until the first production resolves.
    pub fn new_async<F, Fut>(producer: F) -> Result<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::build_async(None, producer)
    }

    /// Create a named asynchronous computed value.
    pub fn named_async<F, Fut>(name: impl Into<String>, producer: F) -> Result<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::build_async(Some(name.into()), producer)
    }

    fn build_async<F, Fut>(name: Option<String>, producer: F) -> Result<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let signal = Signal::build(None, name.clone());

        let body = {
            let backing = signal.clone();
            move |token: CancellationToken| {
                let production = producer(token.clone());
                let backing = backing.clone();
                async move {
                    let value = production.await;
                    if token.is_cancelled() {
                        trace!(signal = %backing.id(), "stale production discarded");
                        return Ok(());
                    }
                    backing.set(Some(value))
                }
            }
        };
        let effect = match name {
            Some(name) => Effect::named_async(name, body),
            None => Effect::new_async(body),
        };
        let effect = match effect {
            Ok(effect) => effect,
            Err(error) => {
                signal.dispose();
                return Err(error);
            }
        };

        Ok(Self { signal, effect })
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            effect: self.effect.clone(),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("signal", &self.signal)
            .field("effect", &self.effect)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

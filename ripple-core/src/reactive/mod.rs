//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, effects and
//! computed values, plus the batching and ownership tools around them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (an effect body), the signal registers that
//! effect as a dependent. When the signal's value changes to something not
//! equal to the old value, all dependents are notified.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Its dependency set is rebuilt on every run, so only
//! the signals the latest run actually read can trigger the next one.
//! Asynchronous effects run on Tokio; their runs are serialized and a new
//! run cancels the previous one.
//!
//! ## Computed Values
//!
//! A Computed is a read-only signal kept up to date by an internal effect.
//!
//! ## Batches and Scopes
//!
//! [`batch`] defers effect re-runs until a group of writes is complete.
//! A [`Scope`] collects the primitives created inside it and disposes them
//! together.
//!
//! # Implementation Notes
//!
//! Dependency detection uses a thread-local stack of tracking contexts.
//! When a signal is read, it checks the top of the stack and, if an effect
//! is running there, records the dependency in both directions.

mod batch;
mod computed;
mod context;
mod effect;
mod runtime;
mod scope;
mod serializer;
mod signal;
mod subscriber;

use std::future::Future;

use tokio_util::sync::CancellationToken;

pub use batch::{batch, is_batching, untrack};
pub use computed::Computed;
pub use context::ReactiveContext;
pub use effect::{Cleanup, Effect, EffectOutput, EffectState};
pub use runtime::{AnyReactive, Hooks, ReactiveId, Runtime};
pub use scope::Scope;
pub use serializer::EffectLock;
pub use signal::{Signal, SignalId};
pub use subscriber::{Subscriber, SubscriberId};

use crate::error::Result;

/// Create a signal. Shorthand for [`Signal::new`].
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    Signal::new(value)
}

/// Create an effect. Shorthand for [`Effect::new`].
pub fn effect<F, R>(body: F) -> Effect
where
    F: Fn(&CancellationToken) -> R + Send + Sync + 'static,
    R: EffectOutput,
{
    Effect::new(body)
}

/// Create an asynchronous effect. Shorthand for [`Effect::new_async`].
pub fn effect_async<F, Fut, R>(body: F) -> Result<Effect>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: EffectOutput + 'static,
{
    Effect::new_async(body)
}

/// Create a computed value. Shorthand for [`Computed::new`].
pub fn computed<T, F>(producer: F) -> Result<Computed<T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(producer)
}

/// Create an asynchronous computed value. Shorthand for
/// [`Computed::new_async`].
pub fn computed_async<T, F, Fut>(producer: F) -> Result<Computed<Option<T>>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    Computed::new_async(producer)
}

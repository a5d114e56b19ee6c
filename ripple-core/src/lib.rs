//! Ripple Core
//!
//! This crate provides a fine-grained reactive engine. It implements:
//!
//! - Signals: observable values that notify dependents on change
//! - Effects: synchronous or asynchronous computations that re-run when the
//!   signals they read change, with cancellation and cleanup
//! - Computed values: derived read-only signals
//! - Batching: coalescing many writes into one round of effect runs
//! - Scopes and lifecycle hooks for renderers that own reactive state
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the primitives, dependency tracking and scheduling
//! - `error`: the error type shared by every fallible operation
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{batch, Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get().unwrap_or_default() * 2
//! })
//! .unwrap();
//!
//! // Create an effect
//! let effect = Effect::new({
//!     let doubled = doubled.clone();
//!     move |_| -> ripple_core::Result<()> {
//!         println!("Doubled: {}", doubled.get()?);
//!         Ok(())
//!     }
//! });
//!
//! // Update the signal
//! count.set(5).unwrap();
//! // Effect automatically runs, prints: "Doubled: 10"
//!
//! batch(|| {
//!     count.set(6).unwrap();
//!     count.set(7).unwrap();
//! });
//! // Prints once: "Doubled: 14"
//!
//! effect.dispose();
//! ```

pub mod error;
pub mod reactive;

pub use error::{ReactiveError, ReactiveKind, Result};
pub use reactive::{
    batch, computed, computed_async, effect, effect_async, signal, untrack, Cleanup, Computed,
    Effect, Scope, Signal,
};
pub use tokio_util::sync::CancellationToken;

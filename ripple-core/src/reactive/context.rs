//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a signal is read, it asks the
//! context for the running effect and links the two in both directions.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running an effect body pushes the effect,
//! finishing it pops. An effect created inside another effect's body pushes
//! on top, completes its first run, and pops back to the outer effect, so
//! reads after the nested creation are still attributed to the outer one.
//!
//! `untrack` pushes an empty entry, which hides the running effect without
//! losing it.
//!
//! Asynchronous effect bodies are wrapped in [`Tracked`], which re-enters the
//! context on every poll. Reads made after an `.await` are attributed to the
//! right effect and never leak into whatever else runs while it is
//! suspended.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use super::signal::{SignalId, Source};
use super::SubscriberId;

/// A computation that can be recorded as a signal's dependent.
pub(crate) trait Observer: Send + Sync {
    /// The ID signals key their subscriber sets by.
    fn subscriber_id(&self) -> SubscriberId;

    /// Called by a signal this observer depends on after it changed.
    fn notify(self: Arc<Self>);

    /// Record that the observer read `signal` during its current run.
    fn track(&self, signal: SignalId, source: Weak<dyn Source>);
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Arc<dyn Observer>>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given observer.
    ///
    /// While this context is active, any signals that are read will
    /// register the observer as a dependent.
    pub(crate) fn enter(observer: Arc<dyn Observer>) -> Self {
        let subscriber_id = Some(observer.subscriber_id());
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Some(observer)));
        Self { subscriber_id }
    }

    /// Enter a context in which reads are not tracked.
    pub fn untracked() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(None));
        Self { subscriber_id: None }
    }

    /// Check if there is an active tracking context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.as_ref().map(|observer| observer.subscriber_id()))
        })
    }

    /// The observer reads should currently be attributed to.
    pub(crate) fn current() -> Option<Arc<dyn Observer>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Drop every entry. Only meant for resetting a thread between tests.
    pub(crate) fn clear() {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().clear());
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catches guards dropped out of order.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.map(|observer| observer.subscriber_id()),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// A future that runs every poll of `future` inside `observer`'s context.
pub(crate) struct Tracked<F> {
    observer: Arc<dyn Observer>,
    future: F,
}

impl<F> Tracked<F> {
    pub(crate) fn new(observer: Arc<dyn Observer>, future: F) -> Self {
        Self { observer, future }
    }
}

impl<F> Future for Tracked<F>
where
    F: Future + Unpin,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _ctx = ReactiveContext::enter(Arc::clone(&this.observer));
        Pin::new(&mut this.future).poll(cx)
    }
}

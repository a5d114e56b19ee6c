//! Reactive Runtime
//!
//! The runtime is the coordinator between signals and the effects that
//! depend on them. It owns the state that is global to a logical thread:
//!
//! - the batch depth and the set of effect re-runs deferred by a batch,
//! - the lifecycle hooks an external renderer installs to learn about
//!   primitives created while it renders a component.
//!
//! # How Notification Works
//!
//! 1. A signal's value changes.
//! 2. The signal snapshots its subscribers and hands them to
//!    [`Runtime::dispatch`].
//! 3. Outside a batch each subscriber runs immediately. Inside a batch it is
//!    queued once, keyed by subscriber ID, and the outermost batch flushes
//!    the queue in first-trigger order.
//!
//! # Thread Model
//!
//! State lives in a thread-local. The core assumes a single logical thread;
//! keeping the state per OS thread also keeps parallel test cases isolated.
//! [`Runtime::reset`] restores a thread to its initial state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use super::context::ReactiveContext;
use super::signal::SignalId;
use super::subscriber::{Subscriber, SubscriberId};
use crate::error::ReactiveKind;

/// Identity of a reactive primitive as reported to lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveId {
    Signal(SignalId),
    Effect(SubscriberId),
}

impl ReactiveId {
    /// Whether this is a signal or an effect.
    pub fn kind(&self) -> ReactiveKind {
        match self {
            ReactiveId::Signal(_) => ReactiveKind::Signal,
            ReactiveId::Effect(_) => ReactiveKind::Effect,
        }
    }
}

impl fmt::Display for ReactiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactiveId::Signal(id) => id.fmt(f),
            ReactiveId::Effect(id) => id.fmt(f),
        }
    }
}

/// Something that can be torn down without knowing its value type.
pub(crate) trait Dispose: Send + Sync {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

/// A type-erased handle to a signal or effect.
///
/// Lifecycle hooks receive these so a renderer can remember what a
/// component created and dispose it when the component goes away.
#[derive(Clone)]
pub struct AnyReactive {
    id: ReactiveId,
    name: Option<String>,
    target: Arc<dyn Dispose>,
}

impl AnyReactive {
    pub(crate) fn new(id: ReactiveId, name: Option<String>, target: Arc<dyn Dispose>) -> Self {
        Self { id, name, target }
    }

    pub fn id(&self) -> ReactiveId {
        self.id
    }

    pub fn kind(&self) -> ReactiveKind {
        self.id.kind()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Dispose the underlying primitive. Safe to call more than once.
    pub fn dispose(&self) {
        self.target.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.target.is_disposed()
    }
}

impl fmt::Debug for AnyReactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyReactive")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

type CreatedHook = Rc<dyn Fn(&AnyReactive)>;
type DisposedHook = Rc<dyn Fn(ReactiveId)>;

/// Lifecycle hooks for external consumers of the core.
///
/// Hooks are per thread. [`Runtime::set_hooks`] returns the hooks it
/// replaced so callers can restore them afterwards.
#[derive(Clone, Default)]
pub struct Hooks {
    on_signal_created: Option<CreatedHook>,
    on_effect_created: Option<CreatedHook>,
    on_signal_tracked: Option<CreatedHook>,
    on_disposed: Option<DisposedHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after a signal (including a computed's backing signal) is created.
    pub fn on_signal_created<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AnyReactive) + 'static,
    {
        self.on_signal_created = Some(Rc::new(hook));
        self
    }

    /// Called after an effect is registered, before its first run.
    pub fn on_effect_created<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AnyReactive) + 'static,
    {
        self.on_effect_created = Some(Rc::new(hook));
        self
    }

    /// Called on every tracked read of any signal, before the read is
    /// attributed to the running effect.
    pub fn on_signal_tracked<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AnyReactive) + 'static,
    {
        self.on_signal_tracked = Some(Rc::new(hook));
        self
    }

    /// Called once when a signal or effect is disposed.
    pub fn on_disposed<F>(mut self, hook: F) -> Self
    where
        F: Fn(ReactiveId) + 'static,
    {
        self.on_disposed = Some(Rc::new(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_signal_created.is_none()
            && self.on_effect_created.is_none()
            && self.on_signal_tracked.is_none()
            && self.on_disposed.is_none()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_signal_created", &self.on_signal_created.is_some())
            .field("on_effect_created", &self.on_effect_created.is_some())
            .field("on_signal_tracked", &self.on_signal_tracked.is_some())
            .field("on_disposed", &self.on_disposed.is_some())
            .finish()
    }
}

#[derive(Default)]
struct RuntimeState {
    batch_depth: usize,
    pending: IndexMap<SubscriberId, Subscriber>,
    hooks: Hooks,
}

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

/// The per-thread reactive runtime.
///
/// This is a stateless facade over the thread's runtime state.
pub struct Runtime;

impl Runtime {
    /// Deliver a change notification to `subscribers`.
    ///
    /// Runs them now, or queues them when a batch is active.
    pub(crate) fn dispatch(subscribers: Vec<Subscriber>) {
        if subscribers.is_empty() {
            return;
        }

        let deferred = RUNTIME.with(|rt| {
            let mut rt = rt.borrow_mut();
            if rt.batch_depth == 0 {
                return false;
            }
            for subscriber in &subscribers {
                rt.pending
                    .entry(subscriber.id())
                    .or_insert_with(|| subscriber.clone());
            }
            true
        });

        if deferred {
            trace!(count = subscribers.len(), "notifications deferred by batch");
            return;
        }

        for subscriber in subscribers {
            subscriber.notify();
        }
    }

    pub(crate) fn enter_batch() {
        RUNTIME.with(|rt| rt.borrow_mut().batch_depth += 1);
    }

    /// Leave one batch level.
    ///
    /// Returns the queued subscribers when the outermost batch closes.
    pub(crate) fn exit_batch() -> Option<Vec<Subscriber>> {
        RUNTIME.with(|rt| {
            let mut rt = rt.borrow_mut();
            rt.batch_depth = rt.batch_depth.saturating_sub(1);
            if rt.batch_depth > 0 {
                return None;
            }
            let pending = std::mem::take(&mut rt.pending);
            Some(pending.into_values().collect())
        })
    }

    /// Whether a batch is active on this thread.
    pub fn is_batching() -> bool {
        RUNTIME.with(|rt| rt.borrow().batch_depth > 0)
    }

    /// Number of effect re-runs waiting for the current batch to close.
    pub fn pending_count() -> usize {
        RUNTIME.with(|rt| rt.borrow().pending.len())
    }

    /// Install lifecycle hooks, returning the ones they replace.
    pub fn set_hooks(hooks: Hooks) -> Hooks {
        RUNTIME.with(|rt| std::mem::replace(&mut rt.borrow_mut().hooks, hooks))
    }

    /// A copy of the installed hooks.
    pub fn hooks() -> Hooks {
        RUNTIME.with(|rt| rt.borrow().hooks.clone())
    }

    pub(crate) fn signal_created(handle: &AnyReactive) {
        let hook = RUNTIME.with(|rt| rt.borrow().hooks.on_signal_created.clone());
        if let Some(hook) = hook {
            hook(handle);
        }
    }

    pub(crate) fn effect_created(handle: &AnyReactive) {
        let hook = RUNTIME.with(|rt| rt.borrow().hooks.on_effect_created.clone());
        if let Some(hook) = hook {
            hook(handle);
        }
    }

    /// The handle is only built when a hook is installed.
    pub(crate) fn signal_tracked(handle: impl FnOnce() -> AnyReactive) {
        let hook = RUNTIME.with(|rt| rt.borrow().hooks.on_signal_tracked.clone());
        if let Some(hook) = hook {
            hook(&handle());
        }
    }

    pub(crate) fn disposed(id: ReactiveId) {
        // Disposal can happen while the thread is shutting down.
        let hook = RUNTIME
            .try_with(|rt| rt.borrow().hooks.on_disposed.clone())
            .ok()
            .flatten();
        if let Some(hook) = hook {
            hook(id);
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Restore this thread's runtime to its initial state.
    ///
    /// Drops queued batch notifications, removes hooks and clears the
    /// tracking context. Existing signals and effects are left untouched.
    pub fn reset() {
        RUNTIME.with(|rt| *rt.borrow_mut() = RuntimeState::default());
        ReactiveContext::clear();
    }
}

//! Ownership Scopes
//!
//! A [`Scope`] collects every signal and effect created while a closure
//! runs inside it, so a component's reactive state can be torn down in one
//! call when the component goes away.
//!
//! Collection is built on the runtime's creation hooks. [`Scope::run`]
//! installs hooks that record into the scope and restores the previous
//! hooks on exit, so scopes nest: primitives belong to the innermost scope
//! that was running when they were created.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::runtime::{AnyReactive, Hooks, Runtime};
use crate::error::ReactiveKind;

#[derive(Default)]
struct ScopeInner {
    members: Vec<AnyReactive>,
    disposed: bool,
}

/// Owner of the primitives created inside [`Scope::run`].
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Effect, Scope, Signal};
///
/// let count = Signal::new(0);
/// let scope = Scope::new();
///
/// scope.run(|| {
///     let count = count.clone();
///     Effect::new(move |_| println!("count = {}", count.get().unwrap()));
/// });
/// assert_eq!(count.subscriber_count(), 1);
///
/// scope.dispose();
/// assert_eq!(count.subscriber_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct Scope {
    inner: Arc<Mutex<ScopeInner>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this scope collecting new signals and effects.
    ///
    /// Returns `None` without calling `f` once the scope is disposed.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if self.is_disposed() {
            return None;
        }

        let previous = Runtime::hooks();
        let hooks = previous
            .clone()
            .on_signal_created(self.collector())
            .on_effect_created(self.collector());

        struct Restore(Option<Hooks>);

        impl Drop for Restore {
            fn drop(&mut self) {
                if let Some(hooks) = self.0.take() {
                    Runtime::set_hooks(hooks);
                }
            }
        }

        Runtime::set_hooks(hooks);
        let _restore = Restore(Some(previous));
        Some(f())
    }

    fn collector(&self) -> impl Fn(&AnyReactive) + 'static {
        let inner = Arc::clone(&self.inner);
        move |handle: &AnyReactive| inner.lock().members.push(handle.clone())
    }

    /// Adopt a primitive created outside [`Scope::run`].
    ///
    /// A disposed scope disposes it right away.
    pub fn adopt(&self, handle: AnyReactive) {
        let mut inner = self.inner.lock();
        if inner.disposed {
            drop(inner);
            handle.dispose();
            return;
        }
        inner.members.push(handle);
    }

    /// Dispose every collected effect, then every collected signal.
    ///
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        let members = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            std::mem::take(&mut inner.members)
        };

        debug!(count = members.len(), "disposing scope");
        let (effects, signals): (Vec<_>, Vec<_>) = members
            .into_iter()
            .partition(|member| member.kind() == ReactiveKind::Effect);
        for member in effects.iter().chain(&signals) {
            member.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Number of primitives owned by the scope.
    pub fn len(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Scope")
            .field("members", &inner.members.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

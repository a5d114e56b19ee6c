//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is scheduled to re-run.
//!
//! 3. Before re-running, the effect cancels the previous run's token, runs
//!    the previous cleanup, and drops its old dependencies. The body then
//!    runs inside a tracking context and records a fresh dependency set,
//!    so dependencies that were only read on a branch not taken this time
//!    are forgotten.
//!
//! # Synchronous and Asynchronous Bodies
//!
//! [`Effect::new`] takes a synchronous body. A re-trigger that arrives
//! while that body is still running (the body wrote to one of its own
//! dependencies) is deferred and executed once, after the body returns.
//!
//! [`Effect::new_async`] takes a body returning a future. Every run is
//! queued on the effect's [`EffectLock`], so runs execute in request order
//! and never overlap. A run is polled once as soon as it is requested; if
//! it does not finish right away it is spawned on the current Tokio
//! runtime. Requesting a run cancels the token of every earlier run, and a
//! queued run whose token was cancelled before it got the lock is skipped.
//!
//! # Cleanup
//!
//! A body may return a [`Cleanup`]. It is called before the next run and
//! when the effect is disposed. Panics and errors from bodies and cleanups
//! are logged and never reach the code that triggered the run.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::Context;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::context::{Observer, ReactiveContext, Tracked};
use super::runtime::{AnyReactive, Dispose, ReactiveId, Runtime};
use super::serializer::EffectLock;
use super::signal::{SignalId, WeakSource};
use super::subscriber::SubscriberId;
use crate::error::{panic_message, ReactiveError, ReactiveKind, Result};

/// Teardown returned by an effect run.
///
/// Invoked before the effect runs again and when it is disposed.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce() + Send>>);

impl Cleanup {
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(cleanup)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cleanup").field(&self.0.is_some()).finish()
    }
}

/// What an effect body may return.
///
/// `()` and [`Cleanup`] are plain successes. A `Result` lets a body use `?`
/// on signal reads; an `Err` is logged as a failed run.
pub trait EffectOutput {
    fn into_outcome(self) -> std::result::Result<Cleanup, String>;
}

impl EffectOutput for () {
    fn into_outcome(self) -> std::result::Result<Cleanup, String> {
        Ok(Cleanup::none())
    }
}

impl EffectOutput for Cleanup {
    fn into_outcome(self) -> std::result::Result<Cleanup, String> {
        Ok(self)
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_outcome(self) -> std::result::Result<Cleanup, String> {
        Ok(self.unwrap_or_default())
    }
}

impl<T, E> EffectOutput for std::result::Result<T, E>
where
    T: EffectOutput,
    E: fmt::Display,
{
    fn into_outcome(self) -> std::result::Result<Cleanup, String> {
        match self {
            Ok(output) => output.into_outcome(),
            Err(error) => Err(error.to_string()),
        }
    }
}

type Outcome = std::result::Result<Cleanup, String>;
type SyncBody = dyn Fn(&CancellationToken) -> Outcome + Send + Sync;
type AsyncBody = dyn Fn(CancellationToken) -> BoxFuture<'static, Outcome> + Send + Sync;
type DisposeHook = Box<dyn FnOnce() + Send>;

enum Body {
    Sync(Box<SyncBody>),
    Async(Box<AsyncBody>),
}

/// Lifecycle state of an effect.
///
/// `Created → Running → Idle → Running → … → Disposed`. `Disposed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// Registered but never run (only lazy effects stay here).
    Created,
    /// A run is executing or suspended.
    Running,
    /// Waiting for a dependency to change.
    Idle,
    /// Torn down. No further runs.
    Disposed,
}

struct EffectCell {
    state: EffectState,
    dependencies: IndexMap<SignalId, WeakSource>,
    cleanup: Cleanup,
    token: CancellationToken,
    run_count: usize,
    rerun_requested: bool,
    on_dispose: SmallVec<[DisposeHook; 1]>,
}

pub(crate) struct EffectInner {
    id: SubscriberId,
    name: Option<String>,
    body: Body,
    /// Runtime async runs are polled and spawned on, captured at creation.
    runtime: Option<Handle>,
    lock: EffectLock,
    cell: Mutex<EffectCell>,
}

impl EffectInner {
    fn disposed_error(&self) -> ReactiveError {
        ReactiveError::disposed(ReactiveKind::Effect, self.name.as_deref())
    }

    /// Request a run.
    fn schedule(self: &Arc<Self>) -> Result<()> {
        match &self.body {
            Body::Sync(body) => self.run_sync(body.as_ref()),
            Body::Async(_) => self.run_async(),
        }
    }

    /// Cancel the current token and install a fresh one for the next run.
    fn supersede(&self) -> Result<CancellationToken> {
        let mut cell = self.cell.lock();
        if cell.state == EffectState::Disposed {
            return Err(self.disposed_error());
        }
        cell.token.cancel();
        let token = CancellationToken::new();
        cell.token = token.clone();
        Ok(token)
    }

    /// Run the previous cleanup and drop the previous dependencies.
    fn teardown_previous(&self) {
        let (cleanup, dependencies) = {
            let mut cell = self.cell.lock();
            (
                std::mem::take(&mut cell.cleanup),
                std::mem::take(&mut cell.dependencies),
            )
        };
        self.invoke_cleanup(cleanup);
        self.release(dependencies);
    }

    fn invoke_cleanup(&self, cleanup: Cleanup) {
        let Some(cleanup) = cleanup.0 else {
            return;
        };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
            let error = ReactiveError::CleanupFailed {
                name: self.name.clone(),
                reason: panic_message(payload),
            };
            warn!(effect = %self.id, %error, "effect cleanup failed");
        }
    }

    fn release(&self, dependencies: IndexMap<SignalId, WeakSource>) {
        for source in dependencies.into_values() {
            if let Some(source) = source.upgrade() {
                source.remove_subscriber(self.id);
            }
        }
    }

    /// Store the result of a finished run.
    fn complete_run(&self, outcome: Outcome) {
        let cleanup = match outcome {
            Ok(cleanup) => cleanup,
            Err(reason) => {
                let error = ReactiveError::EffectFailed {
                    name: self.name.clone(),
                    reason,
                };
                warn!(effect = %self.id, %error, "effect run failed");
                Cleanup::none()
            }
        };

        let mut cell = self.cell.lock();
        cell.run_count += 1;
        if cell.state == EffectState::Disposed {
            // Disposed mid-run: undo what this run set up.
            let dependencies = std::mem::take(&mut cell.dependencies);
            drop(cell);
            self.invoke_cleanup(cleanup);
            self.release(dependencies);
            return;
        }
        cell.cleanup = cleanup;
    }

    fn run_sync(self: &Arc<Self>, body: &SyncBody) -> Result<()> {
        {
            let mut cell = self.cell.lock();
            match cell.state {
                EffectState::Disposed => return Err(self.disposed_error()),
                EffectState::Running => {
                    cell.token.cancel();
                    cell.rerun_requested = true;
                    trace!(effect = %self.id, "re-run deferred until the current run returns");
                    return Ok(());
                }
                EffectState::Created | EffectState::Idle => cell.state = EffectState::Running,
            }
        }

        loop {
            let Ok(token) = self.supersede() else {
                return Ok(());
            };
            self.teardown_previous();

            let outcome = {
                let observer: Arc<dyn Observer> = self.clone();
                let _ctx = ReactiveContext::enter(observer);
                catch_unwind(AssertUnwindSafe(|| body(&token)))
                    .unwrap_or_else(|payload| Err(panic_message(payload)))
            };
            self.complete_run(outcome);

            let mut cell = self.cell.lock();
            match cell.state {
                EffectState::Disposed => return Ok(()),
                _ if cell.rerun_requested => cell.rerun_requested = false,
                _ => {
                    cell.state = EffectState::Idle;
                    return Ok(());
                }
            }
        }
    }

    fn run_async(self: &Arc<Self>) -> Result<()> {
        let runtime = self.runtime.as_ref().ok_or(ReactiveError::NoRuntime)?;
        let token = self.supersede()?;

        let this = Arc::clone(self);
        let mut run = Box::pin(self.lock.run(this.execute_async(token)));

        // The write that triggered this run may come from a thread outside
        // the runtime; timers and IO polled inline need its context.
        let _enter = runtime.enter();

        // The first poll runs the synchronous prefix of the body (when the
        // lock is free) and fixes this run's place in the lock queue.
        let mut cx = Context::from_waker(futures_util::task::noop_waker_ref());
        if run.as_mut().poll(&mut cx).is_pending() {
            runtime.spawn(run);
        }
        Ok(())
    }

    async fn execute_async(self: Arc<Self>, token: CancellationToken) {
        let Body::Async(body) = &self.body else {
            return;
        };
        if token.is_cancelled() {
            debug!(effect = %self.id, "queued run superseded before it started");
            return;
        }
        {
            let mut cell = self.cell.lock();
            if cell.state == EffectState::Disposed {
                return;
            }
            cell.state = EffectState::Running;
        }
        self.teardown_previous();

        let observer: Arc<dyn Observer> = self.clone();
        let started = {
            let _ctx = ReactiveContext::enter(Arc::clone(&observer));
            catch_unwind(AssertUnwindSafe(|| body(token.clone())))
        };
        let outcome = match started {
            Ok(future) => Tracked::new(observer, AssertUnwindSafe(future).catch_unwind())
                .await
                .unwrap_or_else(|payload| Err(panic_message(payload))),
            Err(payload) => Err(panic_message(payload)),
        };
        self.complete_run(outcome);

        let mut cell = self.cell.lock();
        if cell.state != EffectState::Disposed {
            cell.state = EffectState::Idle;
        }
    }
}

impl Observer for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn notify(self: Arc<Self>) {
        match self.schedule() {
            Ok(()) => {}
            Err(error) if error.is_disposed() => {
                trace!(effect = %self.id, "notification for disposed effect ignored");
            }
            Err(error) => warn!(effect = %self.id, %error, "effect could not be scheduled"),
        }
    }

    fn track(&self, signal: SignalId, source: WeakSource) {
        self.cell.lock().dependencies.entry(signal).or_insert(source);
    }
}

impl Dispose for EffectInner {
    fn dispose(&self) {
        let (dependencies, cleanup, hooks) = {
            let mut cell = self.cell.lock();
            if cell.state == EffectState::Disposed {
                return;
            }
            cell.state = EffectState::Disposed;
            cell.token.cancel();
            cell.rerun_requested = false;
            (
                std::mem::take(&mut cell.dependencies),
                std::mem::take(&mut cell.cleanup),
                std::mem::take(&mut cell.on_dispose),
            )
        };

        self.release(dependencies);
        self.invoke_cleanup(cleanup);
        for hook in hooks {
            hook();
        }

        debug!(effect = %self.id, name = ?self.name, "effect disposed");
        Runtime::disposed(ReactiveId::Effect(self.id));
    }

    fn is_disposed(&self) -> bool {
        self.cell.lock().state == EffectState::Disposed
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The handle is cheap to clone. Dropping it does not stop the effect;
/// the signals it depends on keep it alive until [`Effect::dispose`].
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move |_| println!("Count is: {}", count.get().unwrap())
/// });
///
/// count.set(5).unwrap(); // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given body.
    ///
    /// The body runs immediately to establish initial dependencies.
    pub fn new<F, R>(body: F) -> Self
    where
        F: Fn(&CancellationToken) -> R + Send + Sync + 'static,
        R: EffectOutput,
    {
        Self::sync(None, body, true)
    }

    /// Create a new effect with a debug name.
    pub fn named<F, R>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&CancellationToken) -> R + Send + Sync + 'static,
        R: EffectOutput,
    {
        Self::sync(Some(name.into()), body, true)
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies until the first [`Effect::run`].
    pub fn new_lazy<F, R>(body: F) -> Self
    where
        F: Fn(&CancellationToken) -> R + Send + Sync + 'static,
        R: EffectOutput,
    {
        Self::sync(None, body, false)
    }

    /// Create an effect with an asynchronous body.
    ///
    /// Must be called from within a Tokio runtime. The effect keeps a handle
    /// to that runtime, so later runs may be triggered from any thread. The
    /// first run starts before this returns; everything up to the body's
    /// first suspension point has executed by then.
    pub fn new_async<F, Fut, R>(body: F) -> Result<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: EffectOutput + 'static,
    {
        Self::asynchronous(None, body)
    }

    /// Create an asynchronous effect with a debug name.
    pub fn named_async<F, Fut, R>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: EffectOutput + 'static,
    {
        Self::asynchronous(Some(name.into()), body)
    }

    fn sync<F, R>(name: Option<String>, body: F, run: bool) -> Self
    where
        F: Fn(&CancellationToken) -> R + Send + Sync + 'static,
        R: EffectOutput,
    {
        let body: Box<SyncBody> = Box::new(move |token| body(token).into_outcome());
        let effect = Self::register(name, Body::Sync(body), None);
        if run {
            effect.first_run();
        }
        effect
    }

    fn asynchronous<F, Fut, R>(name: Option<String>, body: F) -> Result<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: EffectOutput + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| ReactiveError::NoRuntime)?;

        let body: Box<AsyncBody> =
            Box::new(move |token| body(token).map(R::into_outcome).boxed());
        let effect = Self::register(name, Body::Async(body), Some(runtime));
        effect.first_run();
        Ok(effect)
    }

    fn register(name: Option<String>, body: Body, runtime: Option<Handle>) -> Self {
        let effect = Self {
            inner: Arc::new(EffectInner {
                id: SubscriberId::new(),
                name,
                body,
                runtime,
                lock: EffectLock::new(),
                cell: Mutex::new(EffectCell {
                    state: EffectState::Created,
                    dependencies: IndexMap::new(),
                    cleanup: Cleanup::none(),
                    token: CancellationToken::new(),
                    run_count: 0,
                    rerun_requested: false,
                    on_dispose: SmallVec::new(),
                }),
            }),
        };
        debug!(effect = %effect.inner.id, name = ?effect.inner.name, "effect created");
        Runtime::effect_created(&effect.handle());
        effect
    }

    fn first_run(&self) {
        // A creation hook may already have disposed the effect.
        if let Err(error) = self.inner.schedule() {
            debug!(effect = %self.inner.id, %error, "initial run skipped");
        }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Get the effect's debug name.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Run the effect now, as if a dependency had changed.
    ///
    /// Fails if the effect has been disposed.
    pub fn run(&self) -> Result<()> {
        self.inner.schedule()
    }

    /// Dispose of the effect.
    ///
    /// Unsubscribes from every dependency, cancels an in-flight run and
    /// calls the last cleanup. Disposing twice is a no-op.
    pub fn dispose(&self) {
        Dispose::dispose(&*self.inner);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        Dispose::is_disposed(&*self.inner)
    }

    pub fn state(&self) -> EffectState {
        self.inner.cell.lock().state
    }

    /// Whether a run is executing or suspended right now.
    pub fn is_running(&self) -> bool {
        self.state() == EffectState::Running
    }

    /// Get the number of times the effect has run.
    ///
    /// Counts finished runs, failed ones included. Superseded runs that
    /// never started are not counted.
    pub fn run_count(&self) -> usize {
        self.inner.cell.lock().run_count
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.cell.lock().dependencies.len()
    }

    /// Run `hook` once when the effect is disposed.
    pub fn on_dispose<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.cell.lock().on_dispose.push(Box::new(hook));
    }

    /// A type-erased handle to this effect.
    pub fn handle(&self) -> AnyReactive {
        AnyReactive::new(
            ReactiveId::Effect(self.inner.id),
            self.inner.name.clone(),
            self.inner.clone(),
        )
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.inner.cell.lock();
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &cell.state)
            .field("run_count", &cell.run_count)
            .field("dependency_count", &cell.dependencies.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

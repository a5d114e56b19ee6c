//! Integration Tests for Reactive System
//!
//! These tests verify that signals, effects, computed values, batches and
//! scopes work together correctly.

mod common;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ripple_core::reactive::{
    batch, computed, computed_async, effect, effect_async, signal, Cleanup, Computed, Effect,
    Hooks, ReactiveContext, ReactiveId, Runtime, Scope, Signal, SubscriberId,
};
use ripple_core::{CancellationToken, ReactiveError, ReactiveKind};

use common::{init_tracing, wait_until};

/// Writing an equal value is suppressed; a new value logs exactly once.
#[test]
fn equal_write_is_suppressed() {
    init_tracing();
    let a = signal(3);
    let log = Arc::new(Mutex::new(Vec::new()));

    let _effect = effect({
        let (a, log) = (a.clone(), log.clone());
        move |_| log.lock().push(a.get().unwrap())
    });
    log.lock().clear();

    a.set(3).unwrap();
    assert!(log.lock().is_empty());

    a.set(4).unwrap();
    assert_eq!(*log.lock(), [4]);
}

/// Two writes inside a batch produce one re-run that sees both values.
#[test]
fn batch_produces_single_rerun() {
    init_tracing();
    let a = signal(1);
    let b = signal(1);
    let log = Arc::new(Mutex::new(Vec::new()));

    let _effect = effect({
        let (a, b, log) = (a.clone(), b.clone(), log.clone());
        move |_| log.lock().push(a.get().unwrap() + b.get().unwrap())
    });

    batch(|| {
        a.set(2).unwrap();
        b.set(3).unwrap();
    });

    assert_eq!(*log.lock(), [2, 5]);
}

/// An effect only depends on the signals its latest run read.
#[test]
fn dependencies_follow_the_branch_taken() {
    init_tracing();
    let use_a = signal(true);
    let a = signal("a1".to_owned());
    let b = signal("b1".to_owned());
    let log = Arc::new(Mutex::new(Vec::new()));

    let effect = Effect::named("branch", {
        let (use_a, a, b, log) = (use_a.clone(), a.clone(), b.clone(), log.clone());
        move |_| -> ripple_core::Result<()> {
            let value = if use_a.get()? { a.get()? } else { b.get()? };
            log.lock().push(value);
            Ok(())
        }
    });
    assert_eq!(effect.dependency_count(), 2);

    // B is not a dependency yet.
    b.set("b2".to_owned()).unwrap();
    assert_eq!(*log.lock(), ["a1"]);

    use_a.set(false).unwrap();
    assert_eq!(*log.lock(), ["a1", "b2"]);
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(b.subscriber_count(), 1);

    // A was dropped from the dependency set by the last run.
    a.set("a2".to_owned()).unwrap();
    assert_eq!(*log.lock(), ["a1", "b2"]);

    b.set("b3".to_owned()).unwrap();
    assert_eq!(*log.lock(), ["a1", "b2", "b3"]);
}

/// Disposing twice is a no-op and later access is reported as an error.
#[test]
fn double_dispose_is_harmless() {
    init_tracing();
    let count = Signal::named(0, "count");
    let runs = Arc::new(AtomicI32::new(0));

    let effect = effect({
        let (count, runs) = (count.clone(), runs.clone());
        move |_| {
            let _ = count.get();
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });

    effect.dispose();
    effect.dispose();
    count.dispose();
    count.dispose();

    assert_eq!(
        count.get(),
        Err(ReactiveError::Disposed {
            kind: ReactiveKind::Signal,
            name: Some("count".to_owned()),
        })
    );
    assert!(count.set(1).unwrap_err().is_disposed());
    assert!(effect.run().unwrap_err().is_disposed());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Manual subscribers registered by an external consumer see every change.
#[test]
fn external_subscriber_contract() {
    init_tracing();
    let title = signal("draft".to_owned());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let id = SubscriberId::new();

    title
        .subscribe(id, {
            let (title, seen) = (title.clone(), seen.clone());
            move || seen.lock().push(title.peek().unwrap())
        })
        .unwrap();

    title.set("published".to_owned()).unwrap();
    title.unsubscribe(id);
    title.set("archived".to_owned()).unwrap();

    assert_eq!(*seen.lock(), ["published"]);
    assert_eq!(title.subscriber_count(), 0);
}

/// A computed value's producer runs once per dependency change, not per read.
#[test]
fn computed_memoizes_reads() {
    init_tracing();
    let calls = Arc::new(AtomicI32::new(0));
    let items = signal(vec![1, 2, 3]);

    let total = computed({
        let (items, calls) = (items.clone(), calls.clone());
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            items.with(|items| items.iter().sum::<i32>()).unwrap_or_default()
        }
    })
    .unwrap();

    for _ in 0..5 {
        assert_eq!(total.get().unwrap(), 6);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    items
        .update(|items| items.iter().copied().chain([4]).collect())
        .unwrap();
    assert_eq!(total.get().unwrap(), 10);
    assert_eq!(total.get().unwrap(), 10);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// A chain of computed values feeding an effect.
#[test]
fn full_reactive_chain() {
    init_tracing();
    let first = signal("Ada".to_owned());
    let last = signal("Lovelace".to_owned());

    let full: Computed<String> = Computed::named("full_name", {
        let (first, last) = (first.clone(), last.clone());
        move || format!("{} {}", first.get().unwrap(), last.get().unwrap())
    })
    .unwrap();
    let length = computed({
        let full = full.clone();
        move || full.with(String::len).unwrap_or_default()
    })
    .unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let _effect = effect({
        let (full, length, log) = (full.clone(), length.clone(), log.clone());
        move |_| -> ripple_core::Result<()> {
            log.lock().push(format!("{} ({})", full.get()?, length.get()?));
            Ok(())
        }
    });

    last.set("Byron".to_owned()).unwrap();

    assert_eq!(full.name(), Some("full_name"));
    assert_eq!(log.lock().first().map(String::as_str), Some("Ada Lovelace (12)"));
    assert_eq!(log.lock().last().map(String::as_str), Some("Ada Byron (9)"));
}

/// Effects created inside another effect keep their own dependencies.
#[test]
fn nested_effect_dependencies_are_isolated() {
    init_tracing();
    let outer_source = signal(0);
    let inner_source = signal(0);
    let outer_runs = Arc::new(AtomicI32::new(0));
    let children: Arc<Mutex<Vec<Effect>>> = Arc::new(Mutex::new(Vec::new()));

    let outer = effect({
        let (outer_source, inner_source) = (outer_source.clone(), inner_source.clone());
        let (outer_runs, children) = (outer_runs.clone(), children.clone());
        move |_| {
            let _ = outer_source.get();
            outer_runs.fetch_add(1, Ordering::SeqCst);

            let inner_source = inner_source.clone();
            let child = Effect::new(move |_| {
                let _ = inner_source.get();
            });
            children.lock().push(child.clone());

            // Reads after the child returns are attributed to the outer effect.
            assert!(ReactiveContext::is_active());
            Cleanup::new(move || child.dispose())
        }
    });

    assert_eq!(outer.dependency_count(), 1);
    assert_eq!(inner_source.subscriber_count(), 1);

    inner_source.set(1).unwrap();
    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);

    outer_source.set(1).unwrap();
    assert_eq!(outer_runs.load(Ordering::SeqCst), 2);
    // The first child was cleaned up before the second was created.
    assert_eq!(inner_source.subscriber_count(), 1);

    outer.dispose();
    assert_eq!(inner_source.subscriber_count(), 0);
    assert!(children.lock().iter().all(Effect::is_disposed));
}

/// Lifecycle hooks see every primitive, and a scope disposes what it owns.
#[test]
fn renderer_hooks_and_scope() {
    init_tracing();
    Runtime::reset();
    let disposed: Arc<Mutex<Vec<ReactiveId>>> = Arc::new(Mutex::new(Vec::new()));
    Runtime::set_hooks(Hooks::new().on_disposed({
        let disposed = disposed.clone();
        move |id| disposed.lock().push(id)
    }));

    let store = signal(1);
    let component = Scope::new();
    let (local, view) = component
        .run(|| {
            let local = signal(10);
            let view = effect({
                let (store, local) = (store.clone(), local.clone());
                move |_| {
                    let _ = store.get();
                    let _ = local.get();
                }
            });
            (local, view)
        })
        .unwrap();

    assert_eq!(component.len(), 2);
    component.dispose();

    assert_eq!(
        *disposed.lock(),
        [ReactiveId::Effect(view.id()), ReactiveId::Signal(local.id())]
    );
    assert_eq!(store.subscriber_count(), 0);
    assert!(!store.is_disposed());
    Runtime::reset();
}

/// A retriggered async effect never applies the superseded run's outcome.
#[tokio::test]
async fn async_effect_superseded_run_is_not_observable() {
    init_tracing();
    let query = signal(1);
    let log = Arc::new(Mutex::new(Vec::new()));

    let effect = effect_async({
        let (query, log) = (query.clone(), log.clone());
        move |token: CancellationToken| {
            let value = query.get();
            let log = log.clone();
            async move {
                let value = value?;
                tokio::time::sleep(Duration::from_millis(20)).await;
                if token.is_cancelled() {
                    return Ok(Cleanup::none());
                }
                log.lock().push(format!("result {value}"));
                let log = log.clone();
                Ok::<_, ReactiveError>(Cleanup::new(move || {
                    log.lock().push(format!("cleanup {value}"))
                }))
            }
        }
    })
    .unwrap();

    query.set(2).unwrap();
    wait_until(|| effect.run_count() == 2).await;

    assert_eq!(*log.lock(), ["result 2"]);

    effect.dispose();
    assert_eq!(*log.lock(), ["result 2", "cleanup 2"]);
}

/// Async effect runs are serialized: a run starts only after the previous
/// one has finished.
#[tokio::test]
async fn async_effect_runs_are_serialized() {
    init_tracing();
    let step = signal(0);
    let active = Arc::new(AtomicI32::new(0));
    let overlaps = Arc::new(AtomicI32::new(0));
    let started = Arc::new(AtomicI32::new(0));
    let finished = Arc::new(AtomicI32::new(-1));

    let effect = effect_async({
        let step = step.clone();
        let (active, overlaps) = (active.clone(), overlaps.clone());
        let (started, finished) = (started.clone(), finished.clone());
        move |_| {
            let value = step.get().unwrap_or_default();
            let (active, overlaps) = (active.clone(), overlaps.clone());
            let (started, finished) = (started.clone(), finished.clone());
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if active.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                finished.store(value, Ordering::SeqCst);
            }
        }
    })
    .unwrap();

    for i in 1..=5 {
        step.set(i).unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // The run for the last write is never superseded and is queued behind
    // every other run that executes.
    wait_until(|| finished.load(Ordering::SeqCst) == 5 && !effect.is_running()).await;

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(active.load(Ordering::SeqCst), 0);
    assert_eq!(effect.run_count(), started.load(Ordering::SeqCst) as usize);
}

/// An async computed starts empty and settles on the latest production.
#[tokio::test]
async fn async_computed_follows_latest_input() {
    init_tracing();
    let user_id = signal(1_u32);

    let profile = computed_async({
        let user_id = user_id.clone();
        move |_| {
            let id = user_id.get().unwrap_or_default();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                format!("user-{id}")
            }
        }
    })
    .unwrap();
    assert_eq!(profile.get().unwrap(), None);

    user_id.set(7).unwrap();
    wait_until(|| profile.peek().unwrap().is_some()).await;
    assert_eq!(profile.get().unwrap().as_deref(), Some("user-7"));

    profile.dispose();
    assert_eq!(user_id.subscriber_count(), 0);
}

//! Observability sink boundary.
//!
//! Runtime logic MUST NOT hold counter state directly.
//! All instrumentation flows through ObsEvent and ObsSink.
//!
//! This module is the only bridge between policy logic and the global
//! counter state.

use crate::model::index::IndexKind;
use std::{
    cell::RefCell,
    rc::Rc,
    sync::{LazyLock, Mutex},
};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn ObsSink>>> = const { RefCell::new(None) };
}

///
/// ObsEvent
///

#[derive(Clone, Debug)]
pub enum ObsEvent {
    UniqueViolation {
        bucket: String,
        field: String,
    },
    IndexDelta {
        entity_path: String,
        adds: u64,
        removes: u64,
    },
    BucketCreated {
        bucket: String,
        kind: IndexKind,
    },
    /// Two entity paths share a simple name and therefore an inferred
    /// bucket name. Reported, never silently merged.
    NamingCollision {
        simple_name: String,
        first: String,
        second: String,
    },
}

///
/// ObsSink
///

pub trait ObsSink {
    fn record(&self, event: &ObsEvent);
}

/// Record an event against the scoped sink if one is installed on this
/// thread, else the global counter sink.
pub fn record(event: &ObsEvent) {
    let handled = SINK_OVERRIDE.with(|cell| {
        if let Some(sink) = cell.borrow().as_ref() {
            sink.record(event);
            true
        } else {
            false
        }
    });

    if !handled {
        GlobalCounterSink.record(event);
    }
}

/// Run `f` with `sink` installed as this thread's sink.
/// Restores the previous sink afterwards; intended for tests.
pub fn with_sink<R>(sink: Rc<dyn ObsSink>, f: impl FnOnce() -> R) -> R {
    let previous = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let out = f();
    SINK_OVERRIDE.with(|cell| {
        *cell.borrow_mut() = previous;
    });

    out
}

///
/// ObsCounters
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ObsCounters {
    pub unique_violations: u64,
    pub index_adds: u64,
    pub index_removes: u64,
    pub buckets_created: u64,
    pub naming_collisions: u64,
}

static COUNTERS: LazyLock<Mutex<ObsCounters>> =
    LazyLock::new(|| Mutex::new(ObsCounters::default()));

/// Snapshot the global counters.
#[must_use]
pub fn counters() -> ObsCounters {
    *COUNTERS.lock().expect("obs counters mutex poisoned")
}

/// Reset the global counters. Intended for tests.
pub fn reset_counters() {
    *COUNTERS.lock().expect("obs counters mutex poisoned") = ObsCounters::default();
}

///
/// GlobalCounterSink
/// Default process-wide sink that folds events into the counter state.
///

struct GlobalCounterSink;

impl ObsSink for GlobalCounterSink {
    fn record(&self, event: &ObsEvent) {
        let mut counters = COUNTERS.lock().expect("obs counters mutex poisoned");

        match event {
            ObsEvent::UniqueViolation { .. } => {
                counters.unique_violations = counters.unique_violations.saturating_add(1);
            }
            ObsEvent::IndexDelta { adds, removes, .. } => {
                counters.index_adds = counters.index_adds.saturating_add(*adds);
                counters.index_removes = counters.index_removes.saturating_add(*removes);
            }
            ObsEvent::BucketCreated { .. } => {
                counters.buckets_created = counters.buckets_created.saturating_add(1);
            }
            ObsEvent::NamingCollision { .. } => {
                counters.naming_collisions = counters.naming_collisions.saturating_add(1);
            }
        }
    }
}

///
/// TESTS
///

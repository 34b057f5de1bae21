//! Integration tests for Counter with Store
//!
//! These tests demonstrate the full end-to-end flow: dispatch through
//! middleware, reducer, snapshot replacement and subscriber notification.

#![allow(clippy::unwrap_used)] // Test code can unwrap

use counter::{CounterAction, CounterReducer, CounterState, NonNegative};
use proptest::prelude::*;
use statehub_runtime::{LoggingMiddleware, Store};
use statehub_testing::{RecordingMiddleware, SubscriberProbe};
use std::sync::Arc;

fn guarded_store() -> Store<CounterState, CounterAction> {
    Store::builder(CounterState::default(), CounterReducer::new())
        .middleware(LoggingMiddleware::new())
        .middleware(NonNegative)
        .build()
}

#[test]
fn test_counter_with_store() {
    let store = Store::new(CounterState::default(), CounterReducer::new());

    // Initial state
    assert_eq!(store.state(|s| s.count), 0);

    // Increment
    store.dispatch(CounterAction::Increment).unwrap();
    assert_eq!(store.state(|s| s.count), 1);

    // Increment again
    store.dispatch(CounterAction::Increment).unwrap();
    assert_eq!(store.state(|s| s.count), 2);

    // Decrement
    store.dispatch(CounterAction::Decrement).unwrap();
    assert_eq!(store.state(|s| s.count), 1);

    // Reset
    store.dispatch(CounterAction::Reset).unwrap();
    assert_eq!(store.state(|s| s.count), 0);
}

#[test]
fn test_subscriber_sees_every_dispatch() {
    let store = Store::new(CounterState::default(), CounterReducer::new());
    let probe = SubscriberProbe::attach(&store);

    store.dispatch(CounterAction::Increment).unwrap();
    store.dispatch(CounterAction::Increment).unwrap();
    store.dispatch(CounterAction::Decrement).unwrap();

    assert_eq!(probe.notifications(), 3);
    assert_eq!(probe.values(|s| s.count), vec![1, 2, 1]);
}

#[test]
fn test_non_negative_short_circuits() {
    let store = guarded_store();
    let probe = SubscriberProbe::attach(&store);

    let returned = store.dispatch(CounterAction::Decrement).unwrap();

    assert_eq!(returned, CounterAction::Decrement);
    assert_eq!(store.state(|s| s.count), 0);
    assert_eq!(probe.notifications(), 0);
}

#[test]
fn test_non_negative_drops_overflowing_add() {
    let store = guarded_store();
    store.dispatch(CounterAction::Add(i64::MAX)).unwrap();
    let probe = SubscriberProbe::attach(&store);

    store.dispatch(CounterAction::Add(i64::MAX)).unwrap();
    store.dispatch(CounterAction::Increment).unwrap();

    assert_eq!(store.state(|s| s.count), i64::MAX);
    assert_eq!(probe.notifications(), 0);
}

#[test]
fn test_recorder_sees_dropped_actions() {
    let recorder = RecordingMiddleware::new();
    let store = Store::builder(CounterState::default(), CounterReducer::new())
        .middleware(recorder.clone())
        .middleware(NonNegative)
        .build();

    store.dispatch(CounterAction::Add(-5)).unwrap();
    store.dispatch(CounterAction::Add(5)).unwrap();

    assert_eq!(recorder.kinds(), vec!["counter/add", "counter/add"]);
    assert_eq!(store.state(|s| s.count), 5);
}

#[test]
fn test_reset_at_zero_keeps_snapshot() {
    let store = Store::new(CounterState::default(), CounterReducer::new());
    let before = store.get_state();

    store.dispatch(CounterAction::Reset).unwrap();

    assert!(Arc::ptr_eq(&before, &store.get_state()));
}

proptest! {
    #[test]
    fn guarded_counter_never_goes_negative(deltas in proptest::collection::vec(-5_i64..5, 0..40)) {
        let store = guarded_store();
        for delta in deltas {
            store.dispatch(CounterAction::Add(delta)).unwrap();
            prop_assert!(store.state(|s| s.count) >= 0);
        }
    }
}

//! # Counter Example
//!
//! A simple counter demonstrating a statehub Store.
//!
//! This example showcases:
//! - Basic reducer implementation
//! - Store usage and subscriptions
//! - Middleware that short-circuits an action
//! - State queries
//!
//! ## Architecture
//!
//! The Counter is a **pure state machine**:
//! - The reducer never performs I/O
//! - State changes are synchronous and deterministic
//! - Policy ("never below zero") lives in middleware, not in the reducer
//!
//! ## Example
//!
//! ```
//! use counter::{CounterAction, CounterReducer, CounterState};
//! use statehub_runtime::Store;
//!
//! let store = Store::new(CounterState::default(), CounterReducer::new());
//!
//! store.dispatch(CounterAction::Increment).unwrap();
//! let count = store.state(|s| s.count);
//! assert_eq!(count, 1);
//! ```

use statehub_core::{Action, Reducer, Transition};
use statehub_runtime::{Middleware, Next, Store, StoreError};
use std::borrow::Cow;

/// Counter state
///
/// The state is just a simple count. In a real application, this might
/// contain more complex domain data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
}

/// Counter actions
///
/// These are the events that can happen to the counter.
/// Each action will be processed by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterAction {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Add an arbitrary amount
    Add(i64),
    /// Reset the counter to 0
    Reset,
}

impl Action for CounterAction {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Self::Increment => "counter/increment",
            Self::Decrement => "counter/decrement",
            Self::Add(_) => "counter/add",
            Self::Reset => "counter/reset",
        })
    }
}

/// Counter reducer
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterReducer;

impl CounterReducer {
    /// Create a new counter reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for CounterReducer {
    type State = CounterState;
    type Action = CounterAction;

    fn reduce(&self, state: &CounterState, action: &CounterAction) -> Transition<CounterState> {
        match action {
            CounterAction::Increment => Transition::update(state, |s| s.count = s.count.saturating_add(1)),
            CounterAction::Decrement => Transition::update(state, |s| s.count = s.count.saturating_sub(1)),
            CounterAction::Add(0) => Transition::Unchanged,
            CounterAction::Add(amount) => Transition::update(state, |s| s.count = s.count.saturating_add(*amount)),
            CounterAction::Reset if state.count == 0 => Transition::Unchanged,
            CounterAction::Reset => Transition::Updated(CounterState::default()),
        }
    }
}

/// Drops any action that would take the count below zero or past `i64::MAX`
///
/// Dropped actions never reach the reducer, so subscribers are not notified.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonNegative;

impl Middleware<CounterState, CounterAction> for NonNegative {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("non_negative")
    }

    fn handle(
        &self,
        store: &Store<CounterState, CounterAction>,
        action: CounterAction,
        next: Next<'_, CounterState, CounterAction>,
    ) -> Result<CounterAction, StoreError> {
        let delta = match action {
            CounterAction::Decrement => -1,
            CounterAction::Add(amount) => amount,
            CounterAction::Increment | CounterAction::Reset => 0,
        };

        match store.state(|s| s.count.checked_add(delta)) {
            Some(next_count) if next_count >= 0 => next.run(action),
            Some(_) => {
                tracing::info!(kind = %action.kind(), "Dropped: counter would go negative");
                Ok(action)
            },
            None => {
                tracing::info!(kind = %action.kind(), "Dropped: counter would overflow");
                Ok(action)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statehub_testing::{ReducerTest, assertions};

    #[test]
    fn test_increment() {
        ReducerTest::new(CounterReducer::new())
            .given_state(CounterState { count: 0 })
            .when_action(CounterAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .run();
    }

    #[test]
    fn test_add_and_reset() {
        ReducerTest::new(CounterReducer::new())
            .given_state(CounterState { count: 2 })
            .when_action(CounterAction::Add(40))
            .when_action(CounterAction::Reset)
            .then_state(|state| {
                assert_eq!(state.count, 0);
            })
            .run();
    }

    #[test]
    fn test_add_saturates_at_bounds() {
        ReducerTest::new(CounterReducer::new())
            .given_state(CounterState { count: 1 })
            .when_action(CounterAction::Add(i64::MAX))
            .when_action(CounterAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, i64::MAX);
            })
            .run();

        ReducerTest::new(CounterReducer::new())
            .given_state(CounterState { count: -1 })
            .when_action(CounterAction::Add(i64::MIN))
            .when_action(CounterAction::Decrement)
            .then_state(|state| {
                assert_eq!(state.count, i64::MIN);
            })
            .run();
    }

    #[test]
    fn test_no_op_actions_pass_through() {
        assertions::assert_identity(&CounterReducer, &CounterState { count: 5 }, &CounterAction::Add(0));
        assertions::assert_identity(&CounterReducer, &CounterState { count: 0 }, &CounterAction::Reset);
    }
}

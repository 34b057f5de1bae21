//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`**: Run multiple reducers on the same state/action
//! - **`scope_reducer`**: Focus a reducer on a subset of state
//!
//! Both preserve the identity pass-through: when no inner reducer reacts to
//! an action, the composed reducer reports [`Transition::Unchanged`] and the
//! Store keeps its current snapshot.
//!
//! # Examples
//!
//! ## Combining Reducers
//!
//! ```
//! use statehub_core::{Reducer, Transition};
//! use statehub_core::composition::combine_reducers;
//!
//! #[derive(Clone, Default)]
//! struct MyState {
//!     count: i32,
//!     name: String,
//! }
//!
//! enum MyAction {
//!     Increment,
//!     SetName(String),
//! }
//!
//! struct CounterReducer;
//! struct NameReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = MyState;
//!     type Action = MyAction;
//!
//!     fn reduce(&self, state: &MyState, action: &MyAction) -> Transition<MyState> {
//!         match action {
//!             MyAction::Increment => Transition::update(state, |s| s.count += 1),
//!             MyAction::SetName(_) => Transition::Unchanged,
//!         }
//!     }
//! }
//!
//! impl Reducer for NameReducer {
//!     type State = MyState;
//!     type Action = MyAction;
//!
//!     fn reduce(&self, state: &MyState, action: &MyAction) -> Transition<MyState> {
//!         match action {
//!             MyAction::SetName(name) => Transition::update(state, |s| s.name.clone_from(name)),
//!             MyAction::Increment => Transition::Unchanged,
//!         }
//!     }
//! }
//!
//! let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(NameReducer)]);
//!
//! let state = MyState::default();
//! let next = combined.reduce(&state, &MyAction::Increment).into_state(&state);
//! assert_eq!(next.count, 1);
//! ```

use crate::reducer::{Reducer, Transition};
use std::marker::PhantomData;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer sees the state produced by the reducers before it. The
/// combined transition is `Unchanged` only when every reducer left the state
/// unchanged.
///
/// # Type Parameters
///
/// - `S`: The state type
/// - `A`: The action type
#[must_use]
pub fn combine_reducers<S, A>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A>>>,
) -> CombinedReducer<S, A>
where
    S: 'static,
    A: 'static,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A>
where
    S: 'static,
    A: 'static,
{
    reducers: Vec<Box<dyn Reducer<State = S, Action = A>>>,
}

impl<S, A> Reducer for CombinedReducer<S, A>
where
    S: 'static,
    A: 'static,
{
    type State = S;
    type Action = A;

    fn reduce(&self, state: &Self::State, action: &Self::Action) -> Transition<Self::State> {
        let mut latest: Option<S> = None;

        for reducer in &self.reducers {
            let current = latest.as_ref().unwrap_or(state);
            if let Transition::Updated(next) = reducer.reduce(current, action) {
                latest = Some(next);
            }
        }

        latest.map_or(Transition::Unchanged, Transition::Updated)
    }
}

/// Scopes a reducer to operate on a subset of a larger state.
///
/// This allows you to reuse reducers designed for smaller state types
/// within a larger application state. The parent state is only copied when
/// the child reports an update.
///
/// # Type Parameters
///
/// - `S`: The parent state type
/// - `SubS`: The child state type (subset of `S`)
/// - `A`: The action type
///
/// # Examples
///
/// ```
/// use statehub_core::{Reducer, Transition};
/// use statehub_core::composition::scope_reducer;
///
/// #[derive(Clone, Default)]
/// struct CounterState {
///     count: i32,
/// }
///
/// enum CounterAction {
///     Increment,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = CounterState;
///     type Action = CounterAction;
///
///     fn reduce(&self, state: &CounterState, action: &CounterAction) -> Transition<CounterState> {
///         match action {
///             CounterAction::Increment => Transition::update(state, |s| s.count += 1),
///         }
///     }
/// }
///
/// #[derive(Clone, Default)]
/// struct AppState {
///     counter: CounterState,
///     other_data: String,
/// }
///
/// let scoped = scope_reducer(
///     CounterReducer,
///     |app_state: &AppState| &app_state.counter,
///     |app_state: &mut AppState, counter: CounterState| {
///         app_state.counter = counter;
///     },
/// );
///
/// let state = AppState::default();
/// let next = scoped.reduce(&state, &CounterAction::Increment).into_state(&state);
/// assert_eq!(next.counter.count, 1);
/// ```
pub fn scope_reducer<S, SubS, A, R>(
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
) -> ScopedReducer<S, SubS, A, R>
where
    S: Clone + 'static,
    SubS: 'static,
    A: 'static,
    R: Reducer<State = SubS, Action = A>,
{
    ScopedReducer {
        reducer,
        get_state,
        set_state,
        _phantom: PhantomData,
    }
}

/// A scoped reducer that operates on a subset of state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, SubS, A, R>
where
    S: Clone + 'static,
    SubS: 'static,
    A: 'static,
    R: Reducer<State = SubS, Action = A>,
{
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
    _phantom: PhantomData<fn(&A)>,
}

impl<S, SubS, A, R> Reducer for ScopedReducer<S, SubS, A, R>
where
    S: Clone + 'static,
    SubS: 'static,
    A: 'static,
    R: Reducer<State = SubS, Action = A>,
{
    type State = S;
    type Action = A;

    fn reduce(&self, state: &Self::State, action: &Self::Action) -> Transition<Self::State> {
        let sub_state = (self.get_state)(state);

        match self.reducer.reduce(sub_state, action) {
            Transition::Unchanged => Transition::Unchanged,
            Transition::Updated(next_sub) => {
                let mut next = state.clone();
                (self.set_state)(&mut next, next_sub);
                Transition::Updated(next)
            },
        }
    }
}

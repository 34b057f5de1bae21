//! The Reducer trait - core abstraction for state transitions
//!
//! Reducers are pure functions: `(State, Action) → Transition<State>`.
//!
//! They must not perform I/O, read the wall clock or draw randomness, and
//! they only ever see the current state by shared reference, so the snapshot
//! the Store holds cannot be modified in place. An action the reducer does
//! not recognise yields [`Transition::Unchanged`], which lets the Store keep
//! the exact same snapshot.

use std::marker::PhantomData;

/// The outcome of reducing one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<S> {
    /// The action does not affect this state; the current snapshot stays
    Unchanged,

    /// The action produced a new state value
    Updated(S),
}

impl<S> Transition<S> {
    /// Whether the reducer left the state as it was
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// Resolve the transition against the state it was computed from
    #[must_use]
    pub fn into_state(self, current: &S) -> S
    where
        S: Clone,
    {
        match self {
            Self::Unchanged => current.clone(),
            Self::Updated(next) => next,
        }
    }

    /// Map the new state, if any
    #[must_use]
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Transition<T> {
        match self {
            Self::Unchanged => Transition::Unchanged,
            Self::Updated(next) => Transition::Updated(f(next)),
        }
    }
}

impl<S: Clone> Transition<S> {
    /// Copy `state`, apply `edit` to the copy and return it as the new state
    ///
    /// ```
    /// use statehub_core::Transition;
    ///
    /// let current = vec![1, 2];
    /// let next = Transition::update(&current, |items| items.push(3));
    /// assert_eq!(next, Transition::Updated(vec![1, 2, 3]));
    /// assert_eq!(current, vec![1, 2]);
    /// ```
    #[must_use]
    pub fn update(state: &S, edit: impl FnOnce(&mut S)) -> Self {
        let mut next = state.clone();
        edit(&mut next);
        Self::Updated(next)
    }
}

/// The Reducer trait - core abstraction for business logic
///
/// # Type Parameters
///
/// - `State`: The state this reducer computes transitions for
/// - `Action`: The action type this reducer processes
///
/// # Example
///
/// ```ignore
/// impl Reducer for TodoReducer {
///     type State = TodoState;
///     type Action = TodoAction;
///
///     fn reduce(&self, state: &TodoState, action: &TodoAction) -> Transition<TodoState> {
///         match action {
///             TodoAction::Added { title } => {
///                 Transition::update(state, |s| s.items.push(title.clone()))
///             }
///             _ => Transition::Unchanged,
///         }
///     }
/// }
/// ```
pub trait Reducer: Send + Sync {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// Compute the transition an action causes
    ///
    /// Must be deterministic: the same `state` and `action` always yield an
    /// equal transition.
    fn reduce(&self, state: &Self::State, action: &Self::Action) -> Transition<Self::State>;
}

impl<R: Reducer + ?Sized> Reducer for Box<R> {
    type State = R::State;
    type Action = R::Action;

    fn reduce(&self, state: &Self::State, action: &Self::Action) -> Transition<Self::State> {
        (**self).reduce(state, action)
    }
}

impl<R: Reducer + ?Sized> Reducer for std::sync::Arc<R> {
    type State = R::State;
    type Action = R::Action;

    fn reduce(&self, state: &Self::State, action: &Self::Action) -> Transition<Self::State> {
        (**self).reduce(state, action)
    }
}

/// Adapt a function into a [`Reducer`]
///
/// ```
/// use statehub_core::{Reducer, Transition, reducer_fn};
///
/// let doubling = reducer_fn(|state: &i32, action: &&str| match *action {
///     "double" => Transition::Updated(state * 2),
///     _ => Transition::Unchanged,
/// });
///
/// assert_eq!(doubling.reduce(&4, &"double"), Transition::Updated(8));
/// assert!(doubling.reduce(&4, &"noop").is_unchanged());
/// ```
pub const fn reducer_fn<S, A, F>(f: F) -> FnReducer<S, A, F>
where
    F: Fn(&S, &A) -> Transition<S> + Send + Sync,
{
    FnReducer {
        f,
        _phantom: PhantomData,
    }
}

/// A reducer backed by a function
///
/// Created by [`reducer_fn`].
pub struct FnReducer<S, A, F> {
    f: F,
    _phantom: PhantomData<fn(&S, &A)>,
}

impl<S, A, F> Reducer for FnReducer<S, A, F>
where
    F: Fn(&S, &A) -> Transition<S> + Send + Sync,
{
    type State = S;
    type Action = A;

    fn reduce(&self, state: &S, action: &A) -> Transition<S> {
        (self.f)(state, action)
    }
}

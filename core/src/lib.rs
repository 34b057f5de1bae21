//! # Statehub Core
//!
//! Core traits and types for the statehub architecture.
//!
//! This crate provides the pure, synchronous vocabulary shared by every
//! statehub application: actions, reducers, reducer composition and the
//! records that describe asynchronous tasks. It performs no I/O and owns no
//! runtime; the `statehub-runtime` crate drives these types through a Store.
//!
//! ## Core Concepts
//!
//! - **State**: An immutable snapshot of application data
//! - **Action**: A tagged description of something that happened
//! - **Reducer**: Pure function `(State, Action) → Transition<State>`
//! - **Task record**: The `idle | pending | succeeded | failed` view of one
//!   asynchronous task category, guarded by a request identity
//! - **Environment**: Clock and id generation, injected where time or
//!   identity is needed (never inside a reducer)
//!
//! ## Example
//!
//! ```
//! use std::borrow::Cow;
//! use statehub_core::{Action, Reducer, Transition};
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct CounterState {
//!     value: i64,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//!     Decrement,
//! }
//!
//! impl Action for CounterAction {
//!     fn kind(&self) -> Cow<'_, str> {
//!         match self {
//!             Self::Increment => "counter/increment".into(),
//!             Self::Decrement => "counter/decrement".into(),
//!         }
//!     }
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!
//!     fn reduce(&self, state: &CounterState, action: &CounterAction) -> Transition<CounterState> {
//!         match action {
//!             CounterAction::Increment => Transition::update(state, |s| s.value += 1),
//!             CounterAction::Decrement => Transition::update(state, |s| s.value -= 1),
//!         }
//!     }
//! }
//!
//! let next = CounterReducer
//!     .reduce(&CounterState::default(), &CounterAction::Increment)
//!     .into_state(&CounterState::default());
//! assert_eq!(next.value, 1);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Actions and discriminators
pub mod action;

/// The Reducer trait and state transitions
pub mod reducer;

/// Reducer composition utilities
pub mod composition;

/// Asynchronous task records, events and request identity
pub mod task;

/// Environment module - Dependency injection traits
///
/// Time and identity are the only ambient inputs the async lifecycle needs.
/// Both are abstracted behind traits so the runtime can inject production
/// implementations and tests can inject deterministic ones.
pub mod environment {
    use crate::task::RequestId;
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// struct SystemClock;
    /// impl Clock for SystemClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         Utc::now()
    ///     }
    /// }
    ///
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Source of request identities for the async task lifecycle
    ///
    /// Every identity handed out must be distinct from every other identity
    /// the same generator has produced; ordering is not required.
    pub trait IdGenerator: Send + Sync {
        /// Produce a fresh request identity
        fn next_id(&self) -> RequestId;
    }
}

pub use action::{Action, ActionMeta, AnyAction, InvalidKind, validate_kind};
pub use composition::{combine_reducers, scope_reducer};
pub use environment::{Clock, IdGenerator};
pub use reducer::{Reducer, Transition, reducer_fn};
pub use task::{
    RequestId, TaskCategory, TaskError, TaskEvent, TaskMeta, TaskPhase, TaskRecord, TaskStatus,
};

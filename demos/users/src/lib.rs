//! # Users Example
//!
//! Fetching users through the async task lifecycle.
//!
//! `users/fetchById` is run through a [`TaskManager`]; the Store sees
//! `users/fetchById/pending` followed by `fulfilled`, `rejected` or
//! `aborted`. Two reducers are combined:
//!
//! - the entity cache stores a fetched user only if its response is the
//!   outstanding one
//! - the task record tracks status and drops stale responses
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use users::{SimulatedTransport, fetch_user, users_store};
//! use statehub_runtime::{RunOptions, TaskManager};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = users_store();
//! let tasks = TaskManager::new(store.clone());
//! let transport = Arc::new(SimulatedTransport::new());
//!
//! if let Some(handle) = fetch_user(&tasks, &transport, 1, RunOptions::new())? {
//!     handle.outcome().await?;
//! }
//! assert!(store.state(|s| s.users.contains_key(&1)));
//! # Ok(())
//! # }
//! ```

mod transport;

pub use transport::{SimulatedTransport, TransportError};

use serde::{Deserialize, Serialize};
use statehub_core::{
    Action, Reducer, RequestId, TaskEvent, TaskPhase, TaskRecord, Transition, combine_reducers, scope_reducer,
};
use statehub_runtime::{AbortSignal, LoggingMiddleware, RunOptions, Store, StoreError, TaskHandle, TaskManager};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Task category for fetching one user
pub const FETCH_USER: &str = "users/fetchById";

/// A user as returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier
    pub id: u64,
    /// Display name
    pub name: String,
}

impl User {
    /// The user the simulated service returns for `id`
    #[must_use]
    pub fn sample(id: u64) -> Self {
        Self {
            id,
            name: format!("user-{id}"),
        }
    }
}

/// Users state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersState {
    /// Users fetched so far, by id
    pub users: BTreeMap<u64, User>,

    /// Lifecycle of the latest fetch
    pub fetch: TaskRecord<User>,
}

/// Users actions
#[derive(Debug, Clone)]
pub enum UsersAction {
    /// Lifecycle of `users/fetchById`
    FetchById(TaskEvent<u64, User>),
    /// Forget a cached user
    Evict(u64),
}

impl Action for UsersAction {
    fn kind(&self) -> Cow<'_, str> {
        match self {
            Self::FetchById(event) => Cow::Owned(event.kind()),
            Self::Evict(_) => Cow::Borrowed("users/evict"),
        }
    }

    fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::FetchById(event) => Some(event.request_id()),
            Self::Evict(_) => None,
        }
    }
}

impl From<TaskEvent<u64, User>> for UsersAction {
    fn from(event: TaskEvent<u64, User>) -> Self {
        Self::FetchById(event)
    }
}

/// Keeps the entity cache
///
/// Runs before [`FetchRecordReducer`] so it can ask the record whether a
/// response is still the outstanding one.
pub struct EntitiesReducer;

impl Reducer for EntitiesReducer {
    type State = UsersState;
    type Action = UsersAction;

    fn reduce(&self, state: &UsersState, action: &UsersAction) -> Transition<UsersState> {
        match action {
            UsersAction::FetchById(event) => match &event.phase {
                TaskPhase::Fulfilled(user) if state.fetch.accepts(event) => {
                    Transition::update(state, |s| {
                        s.users.insert(user.id, user.clone());
                    })
                },
                _ => Transition::Unchanged,
            },
            UsersAction::Evict(id) if state.users.contains_key(id) => Transition::update(state, |s| {
                s.users.remove(id);
            }),
            UsersAction::Evict(_) => Transition::Unchanged,
        }
    }
}

/// Tracks the `users/fetchById` task record
pub struct FetchRecordReducer;

impl Reducer for FetchRecordReducer {
    type State = TaskRecord<User>;
    type Action = UsersAction;

    fn reduce(&self, record: &TaskRecord<User>, action: &UsersAction) -> Transition<TaskRecord<User>> {
        match action {
            UsersAction::FetchById(event) => record.reduce(event),
            UsersAction::Evict(_) => Transition::Unchanged,
        }
    }
}

/// The combined users reducer
#[must_use]
pub fn users_reducer() -> impl Reducer<State = UsersState, Action = UsersAction> {
    combine_reducers(vec![
        Box::new(EntitiesReducer),
        Box::new(scope_reducer(
            FetchRecordReducer,
            |state: &UsersState| &state.fetch,
            |state: &mut UsersState, fetch: TaskRecord<User>| state.fetch = fetch,
        )),
    ])
}

/// A users Store with logging
#[must_use]
pub fn users_store() -> Store<UsersState, UsersAction> {
    Store::builder(UsersState::default(), users_reducer())
        .middleware(LoggingMiddleware::new())
        .build()
}

/// Run `users/fetchById` for `id` over `transport`
///
/// # Errors
///
/// Returns the error from dispatching `pending`.
pub fn fetch_user(
    tasks: &TaskManager<UsersState, UsersAction>,
    transport: &Arc<SimulatedTransport>,
    id: u64,
    options: RunOptions<UsersState, u64>,
) -> Result<Option<TaskHandle<User>>, StoreError> {
    let transport = Arc::clone(transport);
    tasks.run(
        FETCH_USER,
        id,
        move |id: u64, signal: AbortSignal| {
            let transport = Arc::clone(&transport);
            async move { transport.fetch_user(id, signal).await }
        },
        options,
    )
}

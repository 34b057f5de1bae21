//! Async task lifecycle
//!
//! [`TaskManager::run`] turns one invocation of an asynchronous operation into
//! a sequence of actions dispatched into the Store:
//!
//! ```text
//! run ──► {category}/pending ──► operation ──► {category}/fulfilled
//!                                          └─► {category}/rejected
//!     abort ──► {category}/aborted ──► (late completion, flagged aborted)
//! ```
//!
//! Each invocation gets a fresh [`RequestId`] which is recorded as the
//! category's outstanding identity before `pending` is dispatched and before
//! the operation starts. Completions always carry their invocation's
//! identity; a [`TaskRecord`](statehub_core::TaskRecord) in state applies a
//! completion only if that identity is still the outstanding one. Late and
//! superseded results are therefore dropped by the reducer, whether or not
//! the operation honoured its abort signal.
//!
//! # Example
//!
//! ```ignore
//! let tasks = TaskManager::new(store.clone());
//!
//! let handle = tasks.run(
//!     "users/fetchById",
//!     user_id,
//!     |id: u64, signal: AbortSignal| async move { api.fetch_user(id, signal).await },
//!     RunOptions::new(),
//! )?;
//!
//! if let Some(handle) = handle {
//!     let outcome = handle.outcome().await?;
//! }
//! ```

use crate::error::StoreError;
use crate::signal::{AbortController, AbortSignal};
use crate::store::Store;
use crate::{RandomIdGenerator, SystemClock};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use statehub_core::action::Action;
use statehub_core::environment::{Clock, IdGenerator};
use statehub_core::task::{RequestId, TaskCategory, TaskError, TaskEvent, TaskPhase};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Decision returned by a run condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Start the invocation
    Proceed,
    /// Skip it: nothing is dispatched and the operation is not called
    Skip,
}

impl From<bool> for Condition {
    fn from(proceed: bool) -> Self {
        if proceed { Self::Proceed } else { Self::Skip }
    }
}

/// An asynchronous operation driven by the task manager
///
/// Receives the invocation argument and an [`AbortSignal`]. Honouring the
/// signal is optional; it only lets the operation release resources early.
pub trait Operation<Arg, T>: Send + Sync + 'static {
    /// Start the operation
    fn call(&self, arg: Arg, signal: AbortSignal) -> BoxFuture<'static, Result<T, TaskError>>;
}

impl<Arg, T, E, F, Fut> Operation<Arg, T> for F
where
    F: Fn(Arg, AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<TaskError> + 'static,
    T: 'static,
{
    fn call(&self, arg: Arg, signal: AbortSignal) -> BoxFuture<'static, Result<T, TaskError>> {
        let future = self(arg, signal);
        Box::pin(async move { future.await.map_err(Into::into) })
    }
}

type ConditionFn<S, Arg> = Arc<dyn Fn(&S, &Arg) -> Condition + Send + Sync>;

/// Per-invocation options for [`TaskManager::run`]
pub struct RunOptions<S, Arg> {
    condition: Option<ConditionFn<S, Arg>>,
    signal: Option<AbortSignal>,
    allow_reentry: bool,
}

impl<S, Arg> RunOptions<S, Arg> {
    /// No condition, no external signal, no re-entry
    #[must_use]
    pub fn new() -> Self {
        Self {
            condition: None,
            signal: None,
            allow_reentry: false,
        }
    }

    /// Consult `condition` against the current state before starting
    ///
    /// ```ignore
    /// RunOptions::new().with_condition(|state: &AppState, id: &u64| {
    ///     (!state.users.contains_key(id)).into()
    /// })
    /// ```
    #[must_use]
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&S, &Arg) -> Condition + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Abort the invocation when `signal` fires
    #[must_use]
    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Start even if an invocation of the same category is outstanding
    ///
    /// The newer invocation supersedes the older one; the older result is
    /// dropped as stale when it arrives.
    #[must_use]
    pub const fn with_reentry(mut self, allow: bool) -> Self {
        self.allow_reentry = allow;
        self
    }
}

impl<S, Arg> Default for RunOptions<S, Arg> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, Arg> Clone for RunOptions<S, Arg> {
    fn clone(&self) -> Self {
        Self {
            condition: self.condition.clone(),
            signal: self.signal.clone(),
            allow_reentry: self.allow_reentry,
        }
    }
}

impl<S, Arg> std::fmt::Debug for RunOptions<S, Arg> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("condition", &self.condition.is_some())
            .field("signal", &self.signal)
            .field("allow_reentry", &self.allow_reentry)
            .finish()
    }
}

/// How an invocation ended, from the caller's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    /// The operation resolved and `fulfilled` was dispatched
    Fulfilled(T),
    /// The operation failed and `rejected` was dispatched
    Rejected(TaskError),
    /// The invocation was cancelled and `aborted` was dispatched
    Aborted,
}

/// Handle to a started invocation
#[derive(Debug)]
pub struct TaskHandle<T> {
    category: TaskCategory,
    request_id: RequestId,
    controller: AbortController,
    join: JoinHandle<Result<TaskOutcome<T>, StoreError>>,
}

impl<T> TaskHandle<T> {
    /// Category of the invocation
    #[must_use]
    pub const fn category(&self) -> &TaskCategory {
        &self.category
    }

    /// Identity of the invocation
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Cancel the invocation
    ///
    /// Returns `false` if it was already cancelled.
    pub fn abort(&self) -> bool {
        self.controller.abort()
    }

    /// Whether every action of the invocation has been dispatched
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait until every action of the invocation has been dispatched
    ///
    /// For a cancelled invocation this includes the late completion.
    ///
    /// # Errors
    ///
    /// - any error returned by dispatching a completion action
    /// - [`StoreError::TaskJoinError`] if dispatching a completion panicked
    pub async fn outcome(self) -> Result<TaskOutcome<T>, StoreError> {
        self.join.await?
    }
}

struct InFlight {
    request_id: RequestId,
    controller: AbortController,
}

type InFlightMap = Arc<Mutex<HashMap<TaskCategory, Vec<InFlight>>>>;

/// Drives asynchronous operations through the task lifecycle
///
/// Cheap to clone; clones share the outstanding-invocation table. Use one
/// manager per Store.
pub struct TaskManager<S, A> {
    store: Store<S, A>,
    in_flight: InFlightMap,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S, A> Clone for TaskManager<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            in_flight: Arc::clone(&self.in_flight),
            clock: Arc::clone(&self.clock),
            ids: Arc::clone(&self.ids),
        }
    }
}

impl<S, A> std::fmt::Debug for TaskManager<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = self.in_flight.lock();
        let categories: Vec<&str> = in_flight.keys().map(TaskCategory::as_str).collect();
        f.debug_struct("TaskManager").field("in_flight", &categories).finish_non_exhaustive()
    }
}

impl<S, A> TaskManager<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    /// Create a manager using the system clock and random identities
    #[must_use]
    pub fn new(store: Store<S, A>) -> Self {
        Self::builder(store).build()
    }

    /// Configure clock and identity source
    #[must_use]
    pub fn builder(store: Store<S, A>) -> TaskManagerBuilder<S, A> {
        TaskManagerBuilder {
            store,
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIdGenerator),
        }
    }

    /// The Store this manager dispatches into
    #[must_use]
    pub const fn store(&self) -> &Store<S, A> {
        &self.store
    }

    /// Start an invocation of `operation` with `arg`
    ///
    /// Returns `Ok(None)` when the run is skipped: the condition said
    /// [`Condition::Skip`], or an invocation of `category` is outstanding and
    /// re-entry was not allowed. A skipped run dispatches nothing and never
    /// calls the operation.
    ///
    /// Otherwise records a fresh identity as the category's outstanding
    /// request, dispatches `pending`, calls the operation and spawns a task
    /// that dispatches the completion.
    ///
    /// A panic in the operation, while starting it or while it runs, is
    /// reported as a `rejected` completion with error name `"Panic"`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NoRuntime`] outside a Tokio runtime; nothing is dispatched
    /// - the error from dispatching `pending`; the operation is not called
    pub fn run<Arg, T, O>(
        &self,
        category: impl Into<TaskCategory>,
        arg: Arg,
        operation: O,
        options: RunOptions<S, Arg>,
    ) -> Result<Option<TaskHandle<T>>, StoreError>
    where
        Arg: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        O: Operation<Arg, T>,
        A: From<TaskEvent<Arg, T>>,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let category = category.into();
        let RunOptions {
            condition,
            signal,
            allow_reentry,
        } = options;

        let started = self.store.serialized(|| self.start(&category, &arg, condition.as_ref(), allow_reentry))?;
        let Some((pending, controller)) = started else {
            metrics::counter!("lifecycle.run.skipped").increment(1);
            return Ok(None);
        };

        let request_id = pending.request_id();
        let span = tracing::debug_span!("task", category = %category, request_id = %request_id);

        let future = span.in_scope(|| {
            tracing::debug!("Starting operation");
            let signal = controller.signal();
            std::panic::catch_unwind(AssertUnwindSafe(|| operation.call(arg, signal))).unwrap_or_else(|payload| {
                let error = panic_error(payload.as_ref());
                async move { Err(error) }.boxed()
            })
        });

        let driver = Driver {
            store: self.store.clone(),
            in_flight: Arc::clone(&self.in_flight),
            clock: Arc::clone(&self.clock),
        };
        let external = signal.unwrap_or_else(AbortSignal::never);
        let join = runtime.spawn(
            driver
                .drive(pending, future, controller.clone(), external)
                .instrument(span),
        );

        Ok(Some(TaskHandle {
            category,
            request_id,
            controller,
            join,
        }))
    }

    /// Check condition and de-duplication, record the identity, dispatch `pending`
    ///
    /// Runs under the Store's dispatch lock so the outstanding identity and
    /// the `pending` action are published together.
    fn start<Arg, T>(
        &self,
        category: &TaskCategory,
        arg: &Arg,
        condition: Option<&ConditionFn<S, Arg>>,
        allow_reentry: bool,
    ) -> Result<Option<(TaskEvent<Arg, T>, AbortController)>, StoreError>
    where
        Arg: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        A: From<TaskEvent<Arg, T>>,
    {
        if let Some(condition) = condition {
            let state = self.store.get_state();
            if condition(&state, arg) == Condition::Skip {
                tracing::debug!(category = %category, "Run skipped by condition");
                return Ok(None);
            }
        }

        let controller = AbortController::new();
        let request_id = {
            let mut in_flight = self.in_flight.lock();
            let outstanding = in_flight.entry(category.clone()).or_default();
            if !outstanding.is_empty() && !allow_reentry {
                tracing::debug!(category = %category, "Run skipped: already pending");
                return Ok(None);
            }
            let request_id = self.ids.next_id();
            outstanding.push(InFlight {
                request_id,
                controller: controller.clone(),
            });
            request_id
        };

        let pending = TaskEvent::pending(category.clone(), request_id, arg.clone(), self.clock.now());
        if let Err(error) = self.store.dispatch(A::from(pending.clone())) {
            release(&self.in_flight, category, request_id);
            tracing::warn!(category = %category, error = %error, "Pending dispatch failed");
            return Err(error);
        }

        metrics::counter!("lifecycle.run.started").increment(1);
        Ok(Some((pending, controller)))
    }

    /// Cancel every outstanding invocation of `category`
    ///
    /// Returns the number of invocations that were signalled.
    pub fn abort(&self, category: impl Into<TaskCategory>) -> usize {
        let category = category.into();
        let controllers: Vec<AbortController> = self
            .in_flight
            .lock()
            .get(&category)
            .map(|outstanding| outstanding.iter().map(|entry| entry.controller.clone()).collect())
            .unwrap_or_default();

        let aborted = controllers.iter().filter(|controller| controller.abort()).count();
        tracing::debug!(category = %category, aborted, "Abort requested");
        aborted
    }

    /// Whether an invocation of `category` is outstanding
    #[must_use]
    pub fn is_pending(&self, category: impl Into<TaskCategory>) -> bool {
        self.in_flight
            .lock()
            .get(&category.into())
            .is_some_and(|outstanding| !outstanding.is_empty())
    }

    /// Identity of the newest outstanding invocation of `category`
    #[must_use]
    pub fn latest_request(&self, category: impl Into<TaskCategory>) -> Option<RequestId> {
        self.in_flight
            .lock()
            .get(&category.into())
            .and_then(|outstanding| outstanding.last())
            .map(|entry| entry.request_id)
    }

    /// Cancel every outstanding invocation
    ///
    /// Returns the number of invocations that were signalled. Their
    /// `aborted` actions are dispatched by the invocations' own tasks.
    pub fn shutdown(&self) -> usize {
        let controllers: Vec<AbortController> = self
            .in_flight
            .lock()
            .values()
            .flatten()
            .map(|entry| entry.controller.clone())
            .collect();

        let aborted = controllers.iter().filter(|controller| controller.abort()).count();
        tracing::info!(aborted, "Task manager shut down");
        aborted
    }
}

/// Builder for [`TaskManager`]
pub struct TaskManagerBuilder<S, A> {
    store: Store<S, A>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S, A> TaskManagerBuilder<S, A> {
    /// Clock used to stamp `requested_at` and `emitted_at`
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Source of request identities
    #[must_use]
    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Build the manager
    #[must_use]
    pub fn build(self) -> TaskManager<S, A> {
        TaskManager {
            store: self.store,
            in_flight: Arc::default(),
            clock: self.clock,
            ids: self.ids,
        }
    }
}

/// Remove `request_id` from the outstanding table
fn release(in_flight: &InFlightMap, category: &TaskCategory, request_id: RequestId) {
    let mut in_flight = in_flight.lock();
    if let Some(outstanding) = in_flight.get_mut(category) {
        outstanding.retain(|entry| entry.request_id != request_id);
        if outstanding.is_empty() {
            in_flight.remove(category);
        }
    }
}

/// Turn a panic while polling `future` into a rejection
fn contain_panics<T: Send + 'static>(
    future: BoxFuture<'static, Result<T, TaskError>>,
) -> BoxFuture<'static, Result<T, TaskError>> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .map(|result| result.unwrap_or_else(|payload| Err(panic_error(payload.as_ref()))))
        .boxed()
}

fn panic_error(payload: &(dyn Any + Send)) -> TaskError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string());
    tracing::error!(message = %message, "Operation panicked");
    TaskError::new("Panic", message)
}

/// The spawned half of one invocation
struct Driver<S, A> {
    store: Store<S, A>,
    in_flight: InFlightMap,
    clock: Arc<dyn Clock>,
}

impl<S, A> Driver<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    async fn drive<Arg, T>(
        self,
        pending: TaskEvent<Arg, T>,
        future: BoxFuture<'static, Result<T, TaskError>>,
        controller: AbortController,
        external: AbortSignal,
    ) -> Result<TaskOutcome<T>, StoreError>
    where
        Arg: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        A: From<TaskEvent<Arg, T>>,
    {
        let started = Instant::now();
        let internal = controller.signal();
        let mut future = contain_panics(future);

        // A cancellation requested before the result is observed wins
        let settled = tokio::select! {
            biased;
            () = internal.aborted() => None,
            () = external.aborted() => None,
            result = &mut future => Some(result),
        };

        if let Some(result) = settled {
            release(&self.in_flight, &pending.category, pending.request_id());
            metrics::histogram!("lifecycle.run.duration_seconds").record(started.elapsed().as_secs_f64());
            return self.complete(&pending, result, false);
        }

        // Let the operation see the cancellation even if it came from outside
        controller.abort();
        release(&self.in_flight, &pending.category, pending.request_id());
        metrics::counter!("lifecycle.run.aborted").increment(1);
        tracing::debug!("Operation aborted");

        let aborted = pending.settle(TaskPhase::Aborted, self.clock.now(), true);
        self.store.dispatch(A::from(aborted))?;

        let late = future.await;
        tracing::debug!(ok = late.is_ok(), "Operation settled after abort");
        self.complete(&pending, late, true)?;

        Ok(TaskOutcome::Aborted)
    }

    fn complete<Arg, T>(
        &self,
        pending: &TaskEvent<Arg, T>,
        result: Result<T, TaskError>,
        aborted: bool,
    ) -> Result<TaskOutcome<T>, StoreError>
    where
        Arg: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        A: From<TaskEvent<Arg, T>>,
    {
        let (phase, outcome) = match result {
            Ok(value) => {
                metrics::counter!("lifecycle.run.fulfilled").increment(1);
                (TaskPhase::Fulfilled(value.clone()), TaskOutcome::Fulfilled(value))
            },
            Err(error) => {
                metrics::counter!("lifecycle.run.rejected").increment(1);
                tracing::debug!(error = %error, "Operation failed");
                (TaskPhase::Rejected(error.clone()), TaskOutcome::Rejected(error))
            },
        };

        let event = pending.settle(phase, self.clock.now(), aborted);
        self.store.dispatch(A::from(event))?;
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use statehub_core::reducer::{Reducer, Transition};
    use statehub_core::task::{TaskRecord, TaskStatus};
    use std::borrow::Cow;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone)]
    enum Msg {
        Lookup(TaskEvent<u32, String>),
    }

    impl Action for Msg {
        fn kind(&self) -> Cow<'_, str> {
            match self {
                Self::Lookup(event) => Cow::Owned(event.kind()),
            }
        }
    }

    impl From<TaskEvent<u32, String>> for Msg {
        fn from(event: TaskEvent<u32, String>) -> Self {
            Self::Lookup(event)
        }
    }

    struct LookupReducer;

    impl Reducer for LookupReducer {
        type State = TaskRecord<String>;
        type Action = Msg;

        fn reduce(&self, state: &TaskRecord<String>, action: &Msg) -> Transition<TaskRecord<String>> {
            match action {
                Msg::Lookup(event) => state.reduce(event),
            }
        }
    }

    struct Counter(AtomicU64);

    impl IdGenerator for Counter {
        fn next_id(&self) -> RequestId {
            RequestId::new(self.0.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    fn manager() -> TaskManager<TaskRecord<String>, Msg> {
        let store = Store::new(TaskRecord::default(), LookupReducer);
        TaskManager::builder(store).id_generator(Counter(AtomicU64::new(0))).build()
    }

    fn kinds(store: &Store<TaskRecord<String>, Msg>) -> Arc<Mutex<Vec<String>>> {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let log = Arc::clone(&seen);
        let weak = store.downgrade();
        let _subscription = store.subscribe(move || {
            if let Some(store) = weak.upgrade() {
                log.lock().push(store.state(|record| record.status.to_string()));
            }
        });
        seen
    }

    #[tokio::test]
    async fn test_run_dispatches_pending_then_fulfilled() {
        let tasks = manager();
        let statuses = kinds(tasks.store());

        let handle = tasks
            .run(
                "lookup",
                7,
                |n: u32, _signal: AbortSignal| async move { Ok::<_, TaskError>(format!("user-{n}")) },
                RunOptions::new(),
            )
            .unwrap()
            .unwrap();

        assert_eq!(handle.request_id(), RequestId::new(1));
        let outcome = handle.outcome().await.unwrap();

        assert_eq!(outcome, TaskOutcome::Fulfilled("user-7".to_string()));
        assert_eq!(*statuses.lock(), vec!["pending", "succeeded"]);
        let record = tasks.store().get_state();
        assert_eq!(record.result.as_deref(), Some("user-7"));
        assert!(!tasks.is_pending("lookup"));
    }

    #[tokio::test]
    async fn test_run_dispatches_rejected() {
        let tasks = manager();

        let handle = tasks
            .run(
                "lookup",
                1,
                |_n: u32, _signal: AbortSignal| async move { Err::<String, _>("not found") },
                RunOptions::new(),
            )
            .unwrap()
            .unwrap();

        let outcome = handle.outcome().await.unwrap();
        assert_eq!(outcome, TaskOutcome::Rejected(TaskError::new("Error", "not found")));

        let record = tasks.store().get_state();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_ref().map(|e| e.message.as_str()), Some("not found"));
    }

    #[tokio::test]
    async fn test_condition_skip_dispatches_nothing() {
        let tasks = manager();
        let statuses = kinds(tasks.store());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let handle = tasks
            .run(
                "lookup",
                1,
                move |_n: u32, _signal: AbortSignal| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, TaskError>(String::new()) }
                },
                RunOptions::new().with_condition(|_state: &TaskRecord<String>, n: &u32| (*n > 1).into()),
            )
            .unwrap();

        assert!(handle.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(statuses.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pending_category_is_deduplicated() {
        fn gated(
            calls: &Arc<AtomicUsize>,
            gate: &Arc<Mutex<Option<oneshot::Receiver<()>>>>,
        ) -> impl Fn(u32, AbortSignal) -> BoxFuture<'static, Result<String, TaskError>> + Send + Sync + 'static {
            let calls = Arc::clone(calls);
            let gate = Arc::clone(gate);
            move |_n, _signal| {
                calls.fetch_add(1, Ordering::SeqCst);
                let gate = gate.lock().take();
                Box::pin(async move {
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    Ok("done".to_string())
                })
            }
        }

        let tasks = manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(release_rx)));

        let first = tasks.run("lookup", 1, gated(&calls, &gate), RunOptions::new()).unwrap();
        let second = tasks.run("lookup", 1, gated(&calls, &gate), RunOptions::new()).unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(tasks.is_pending("lookup"));
        assert_eq!(tasks.latest_request("lookup"), Some(RequestId::new(1)));

        release_tx.send(()).unwrap();
        first.unwrap().outcome().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_dispatches_aborted_and_drops_late_result() {
        let tasks = manager();
        let statuses = kinds(tasks.store());
        let (finish_tx, finish_rx) = oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(finish_rx)));

        let handle = tasks
            .run(
                "lookup",
                1,
                move |_n: u32, _signal: AbortSignal| {
                    let gate = gate.lock().take();
                    async move {
                        if let Some(gate) = gate {
                            let _ = gate.await;
                        }
                        Ok::<_, TaskError>("late".to_string())
                    }
                },
                RunOptions::new(),
            )
            .unwrap()
            .unwrap();

        assert!(handle.abort());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!tasks.is_pending("lookup"));
        assert_eq!(tasks.store().state(|record| record.status), TaskStatus::Idle);

        finish_tx.send(()).unwrap();
        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::Aborted);

        let record = tasks.store().get_state();
        assert_eq!(record.status, TaskStatus::Idle);
        assert_eq!(record.result, None);
        assert_eq!(record.stale_dropped, 1);
        assert_eq!(*statuses.lock(), vec!["pending", "idle", "idle"]);
    }

    #[tokio::test]
    async fn test_operation_sees_abort_signal() {
        let tasks = manager();
        let controller = AbortController::new();

        let handle = tasks
            .run(
                "lookup",
                1,
                |_n: u32, signal: AbortSignal| async move {
                    signal.aborted().await;
                    Err::<String, _>(TaskError::aborted())
                },
                RunOptions::new().with_signal(controller.signal()),
            )
            .unwrap()
            .unwrap();

        controller.abort();
        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::Aborted);

        let record = tasks.store().get_state();
        assert_eq!(record.status, TaskStatus::Idle);
        assert_eq!(record.error, None);
        assert_eq!(record.stale_dropped, 1);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_everything() {
        let tasks = manager();

        let handle = tasks
            .run(
                "lookup",
                1,
                |_n: u32, signal: AbortSignal| async move {
                    signal.aborted().await;
                    Ok::<_, TaskError>(String::new())
                },
                RunOptions::new(),
            )
            .unwrap()
            .unwrap();

        assert_eq!(tasks.shutdown(), 1);
        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::Aborted);
        assert_eq!(tasks.shutdown(), 0);
    }

    #[tokio::test]
    async fn test_pending_dispatch_failure_skips_operation() {
        let tasks = manager();
        tasks.store().close();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let result = tasks.run(
            "lookup",
            1,
            move |_n: u32, _signal: AbortSignal| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, TaskError>(String::new()) }
            },
            RunOptions::new(),
        );

        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!tasks.is_pending("lookup"));
    }

    #[tokio::test]
    #[allow(clippy::panic)] // The operation under test panics on purpose
    async fn test_panicking_operation_is_rejected_and_releases_category() {
        let tasks = manager();

        let handle = tasks
            .run(
                "lookup",
                1,
                |_n: u32, _signal: AbortSignal| async move {
                    if true {
                        panic!("lookup exploded");
                    }
                    Ok::<_, TaskError>(String::new())
                },
                RunOptions::new(),
            )
            .unwrap()
            .unwrap();

        let outcome = handle.outcome().await.unwrap();
        assert_eq!(outcome, TaskOutcome::Rejected(TaskError::new("Panic", "lookup exploded")));
        assert!(!tasks.is_pending("lookup"));

        let record = tasks.store().get_state();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_ref().map(|e| e.name.as_str()), Some("Panic"));

        let retry = tasks
            .run(
                "lookup",
                2,
                |n: u32, _signal: AbortSignal| async move { Ok::<_, TaskError>(format!("user-{n}")) },
                RunOptions::new(),
            )
            .unwrap();
        assert_eq!(
            retry.unwrap().outcome().await.unwrap(),
            TaskOutcome::Fulfilled("user-2".to_string())
        );
    }

    #[tokio::test]
    #[allow(clippy::panic)] // The operation under test panics on purpose
    async fn test_operation_panicking_before_its_future_is_rejected() {
        fn explode(_n: u32, _signal: AbortSignal) -> BoxFuture<'static, Result<String, TaskError>> {
            panic!("no connection")
        }

        let tasks = manager();
        let handle = tasks.run("lookup", 1, explode, RunOptions::new()).unwrap().unwrap();

        let outcome = handle.outcome().await.unwrap();
        assert_eq!(outcome, TaskOutcome::Rejected(TaskError::new("Panic", "no connection")));
        assert!(!tasks.is_pending("lookup"));
        assert_eq!(tasks.store().state(|record| record.status), TaskStatus::Failed);
    }

    #[test]
    fn test_run_outside_runtime_dispatches_nothing() {
        let tasks = manager();
        let statuses = kinds(tasks.store());

        let result = tasks.run(
            "lookup",
            1,
            |_n: u32, _signal: AbortSignal| async move { Ok::<_, TaskError>(String::new()) },
            RunOptions::new(),
        );

        assert!(matches!(result, Err(StoreError::NoRuntime)));
        assert!(!tasks.is_pending("lookup"));
        assert!(statuses.lock().is_empty());
        assert_eq!(tasks.store().state(|record| record.status), TaskStatus::Idle);
    }

    #[test]
    fn test_condition_from_bool() {
        assert_eq!(Condition::from(true), Condition::Proceed);
        assert_eq!(Condition::from(false), Condition::Skip);
    }
}

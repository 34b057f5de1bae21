//! The Store - single authoritative state container
//!
//! The Store holds the current state snapshot behind an `Arc`, runs every
//! dispatched action through the middleware chain into the reducer, replaces
//! the snapshot when the reducer produces a new state and then notifies
//! subscribers synchronously, in registration order.
//!
//! # Concurrency
//!
//! Dispatch is serialized: a reentrant lock makes "run chain, reduce,
//! replace, notify" one critical section with respect to other threads,
//! while still letting middleware and subscribers dispatch again from the
//! same thread. Such nested dispatches complete depth-first before control
//! returns to the outer one. Readers never block on a dispatch in progress;
//! they always observe a complete snapshot.

use crate::StoreConfig;
use crate::error::StoreError;
use crate::middleware::{Middleware, MiddlewareChain};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use statehub_core::action::{Action, validate_kind};
use statehub_core::reducer::{Reducer, Transition};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Registered subscribers, in registration order
#[derive(Default)]
struct SubscriberRegistry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl SubscriberRegistry {
    fn insert(&mut self, listener: Listener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    fn remove(&mut self, id: u64) {
        self.listeners.retain(|(existing, _)| *existing != id);
    }

    fn snapshot(&self) -> Vec<Listener> {
        self.listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect()
    }
}

/// Per-thread-of-control bookkeeping, guarded by the dispatch lock
#[derive(Default)]
struct DispatchFrame {
    depth: Cell<usize>,
    reducing: Cell<bool>,
}

/// Restores a `Cell` to its previous value on drop, even if a reducer or
/// middleware panics.
struct Restore<'a, T: Copy> {
    cell: &'a Cell<T>,
    previous: T,
}

impl<'a, T: Copy> Restore<'a, T> {
    fn set(cell: &'a Cell<T>, value: T) -> Self {
        let previous = cell.replace(value);
        Self { cell, previous }
    }
}

impl<T: Copy> Drop for Restore<'_, T> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

struct StoreInner<S, A> {
    state: RwLock<Arc<S>>,
    reducer: Box<dyn Reducer<State = S, Action = A>>,
    chain: MiddlewareChain<S, A>,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    dispatch_lock: ReentrantMutex<DispatchFrame>,
    closed: AtomicBool,
    config: StoreConfig,
}

/// The Store - runtime coordinator for a reducer
///
/// `Store` is a cheap handle: clones share the same state, reducer,
/// middleware and subscribers. Create one per application (or per feature)
/// and pass it explicitly to whoever needs it.
///
/// # Type Parameters
///
/// - `S`: State type
/// - `A`: Action type
///
/// # Example
///
/// ```ignore
/// let store = Store::new(CounterState::default(), CounterReducer);
///
/// let subscription = store.subscribe(|| println!("changed"));
/// store.dispatch(CounterAction::Increment)?;
/// assert_eq!(store.state(|s| s.value), 1);
///
/// subscription.unsubscribe();
/// ```
pub struct Store<S, A> {
    inner: Arc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A> std::fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.config.name())
            .field("middleware", &self.inner.chain)
            .field("subscribers", &self.inner.subscribers.lock().listeners.len())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<S, A> Store<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    /// Create a store with no middleware and default configuration
    #[must_use]
    pub fn new<R>(initial_state: S, reducer: R) -> Self
    where
        R: Reducer<State = S, Action = A> + 'static,
    {
        Self::builder(initial_state, reducer).build()
    }

    /// Start configuring a store
    ///
    /// ```ignore
    /// let store = Store::builder(AppState::default(), AppReducer)
    ///     .middleware(LoggingMiddleware::new())
    ///     .config(StoreConfig::default().with_name("app"))
    ///     .build();
    /// ```
    #[must_use]
    pub fn builder<R>(initial_state: S, reducer: R) -> StoreBuilder<S, A>
    where
        R: Reducer<State = S, Action = A> + 'static,
    {
        StoreBuilder {
            initial_state,
            reducer: Box::new(reducer),
            chain: MiddlewareChain::new(),
            config: StoreConfig::default(),
        }
    }

    /// Current state snapshot
    ///
    /// O(1): clones the `Arc`, never the state.
    #[must_use]
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&self.inner.state.read())
    }

    /// Read current state via a closure
    ///
    /// ```ignore
    /// let order_count = store.state(|s| s.orders.len());
    /// ```
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let snapshot = self.get_state();
        f(&snapshot)
    }

    /// Dispatch an action
    ///
    /// Runs the action through the middleware chain. The terminal stage
    /// applies the reducer, replaces the snapshot if the reducer produced a
    /// new state, and notifies every subscriber registered at that moment.
    /// Subscribers are notified even when the reducer left the state
    /// unchanged.
    ///
    /// Returns whatever the outermost middleware returns; with no middleware
    /// (or pass-through middleware) that is the action itself.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidAction`] if the action kind is empty or blank
    /// - [`StoreError::ShutdownInProgress`] after [`close`](Self::close)
    /// - [`StoreError::ReducerViolation`] if called from inside the reducer
    /// - [`StoreError::DispatchDepthExceeded`] if re-entrant dispatch nests
    ///   deeper than [`StoreConfig::max_dispatch_depth`]
    /// - any error raised by a middleware
    ///
    /// # Panics
    ///
    /// If the reducer or a subscriber panics, the panic propagates to the
    /// caller. The state snapshot is only replaced once the reducer has
    /// returned, so a panicking reducer leaves the previous state in place.
    #[tracing::instrument(skip_all, name = "store_dispatch", fields(store = %self.inner.config.name(), kind = %action.kind()))]
    pub fn dispatch(&self, action: A) -> Result<A, StoreError> {
        if self.inner.closed.load(Ordering::Acquire) {
            tracing::warn!("Rejected action: store is shutting down");
            metrics::counter!("store.shutdown.rejected_actions").increment(1);
            return Err(StoreError::ShutdownInProgress);
        }

        validate_kind(&action.kind())?;

        let frame = self.inner.dispatch_lock.lock();

        if frame.reducing.get() {
            tracing::error!("Reducer attempted to dispatch");
            return Err(StoreError::ReducerViolation(
                "reducers may not dispatch actions".to_string(),
            ));
        }

        let depth = frame.depth.get();
        let max_depth = self.inner.config.max_dispatch_depth();
        if depth >= max_depth {
            tracing::error!(depth, "Dispatch nesting limit reached");
            return Err(StoreError::DispatchDepthExceeded(max_depth));
        }
        let _depth = Restore::set(&frame.depth, depth + 1);

        tracing::debug!(depth, "Processing action");
        metrics::counter!("store.dispatch.total").increment(1);

        let terminal = |action: A| self.apply(action);
        self.inner.chain.dispatch(self, action, &terminal)
    }

    /// Terminal stage of the chain: reduce, replace, notify
    fn apply(&self, action: A) -> Result<A, StoreError> {
        // Middleware may have rewritten the action on its way in
        validate_kind(&action.kind())?;

        let frame = self.inner.dispatch_lock.lock();
        let current = self.get_state();

        let transition = {
            let _reducing = Restore::set(&frame.reducing, true);
            let span = tracing::debug_span!("reducer_execution");
            let _enter = span.enter();

            let start = std::time::Instant::now();
            let transition = self.inner.reducer.reduce(&current, &action);
            metrics::histogram!("store.reducer.duration_seconds")
                .record(start.elapsed().as_secs_f64());
            transition
        };

        match transition {
            Transition::Updated(next) => {
                *self.inner.state.write() = Arc::new(next);
                tracing::trace!("State replaced");
            },
            Transition::Unchanged => {
                metrics::counter!("store.dispatch.unchanged").increment(1);
                tracing::trace!("Reducer left state unchanged");
            },
        }

        self.notify();
        Ok(action)
    }

    /// Run `f` while holding the dispatch lock
    ///
    /// Dispatches from other threads wait until `f` returns; dispatches made
    /// by `f` itself proceed as nested dispatches.
    pub(crate) fn serialized<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = self.inner.dispatch_lock.lock();
        f()
    }

    /// Call every subscriber registered when the pass starts
    fn notify(&self) {
        let listeners = self.inner.subscribers.lock().snapshot();
        tracing::trace!(subscribers = listeners.len(), "Notifying subscribers");
        for listener in listeners {
            listener();
        }
    }

    /// Register a callback invoked after every dispatch that reaches the reducer
    ///
    /// The callback takes no arguments; read the new state with
    /// [`get_state`](Self::get_state). A subscriber added while a
    /// notification pass is running is first called on the next dispatch.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.lock().insert(Arc::new(listener));
        tracing::debug!(subscriber = id, "Subscriber registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner.subscribers),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().listeners.len()
    }

    /// Stop accepting actions and drop every subscriber
    ///
    /// Subsequent dispatches fail with [`StoreError::ShutdownInProgress`].
    /// State remains readable.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let mut registry = self.inner.subscribers.lock();
            let dropped = registry.listeners.len();
            registry.listeners.clear();
            tracing::info!(subscribers = dropped, "Store closed");
            metrics::counter!("store.closed").increment(1);
        }
    }

    /// Whether [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The configuration this store was built with
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// A handle that does not keep the store alive
    ///
    /// Use it inside subscribers and middleware facilities that would
    /// otherwise form a reference cycle with the store.
    #[must_use]
    pub fn downgrade(&self) -> WeakStore<S, A> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning store handle
///
/// Created by [`Store::downgrade`].
pub struct WeakStore<S, A> {
    inner: Weak<StoreInner<S, A>>,
}

impl<S, A> WeakStore<S, A> {
    /// The store, if it is still alive
    #[must_use]
    pub fn upgrade(&self) -> Option<Store<S, A>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<S, A> Clone for WeakStore<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// Handle returned by [`Store::subscribe`]
///
/// Dropping the handle does not unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe).
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<SubscriberRegistry>>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Remove the subscriber
    ///
    /// Returns `true` the first time and `false` on every later call. If a
    /// notification pass is running, the subscriber still receives that
    /// pass's notification.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(self.id);
            tracing::debug!(subscriber = self.id, "Subscriber removed");
        }
        true
    }

    /// Whether the subscriber is still registered through this handle
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Builder for [`Store`]
///
/// Created by [`Store::builder`].
pub struct StoreBuilder<S, A> {
    initial_state: S,
    reducer: Box<dyn Reducer<State = S, Action = A>>,
    chain: MiddlewareChain<S, A>,
    config: StoreConfig,
}

impl<S, A> StoreBuilder<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    /// Append a middleware; the first one appended is outermost
    #[must_use]
    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware<S, A> + 'static,
    {
        self.chain.push(middleware);
        self
    }

    /// Replace the middleware chain
    #[must_use]
    pub fn chain(mut self, chain: MiddlewareChain<S, A>) -> Self {
        self.chain = chain;
        self
    }

    /// Set the store configuration
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the store
    #[must_use]
    pub fn build(self) -> Store<S, A> {
        tracing::debug!(
            store = %self.config.name(),
            middleware = ?self.chain,
            "Store created"
        );

        Store {
            inner: Arc::new(StoreInner {
                state: RwLock::new(Arc::new(self.initial_state)),
                reducer: self.reducer,
                chain: self.chain,
                subscribers: Arc::default(),
                dispatch_lock: ReentrantMutex::new(DispatchFrame::default()),
                closed: AtomicBool::new(false),
                config: self.config,
            }),
        }
    }
}

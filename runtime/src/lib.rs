//! # Statehub Runtime
//!
//! Runtime implementation for the statehub architecture.
//!
//! This crate provides the Store that owns application state, the middleware
//! chain that wraps every dispatch, and the task manager that drives
//! asynchronous operations through the `pending → fulfilled | rejected`
//! lifecycle.
//!
//! ## Core Components
//!
//! - **Store**: Holds the authoritative state snapshot, dispatches actions
//!   through the middleware chain into the reducer and notifies subscribers
//! - **Middleware chain**: Ordered interceptors; each may inspect, transform,
//!   short-circuit or re-dispatch
//! - **Task manager**: Wraps async operations with request identities,
//!   de-duplication and cooperative cancellation
//!
//! ## Example
//!
//! ```ignore
//! use statehub_runtime::{LoggingMiddleware, Store};
//!
//! let store = Store::builder(CounterState::default(), CounterReducer)
//!     .middleware(LoggingMiddleware::new())
//!     .build();
//!
//! let _subscription = store.subscribe(|| println!("state changed"));
//! store.dispatch(CounterAction::Increment)?;
//!
//! let value = store.state(|s| s.value);
//! ```

use chrono::{DateTime, Utc};
use statehub_core::environment::{Clock, IdGenerator};
use statehub_core::task::RequestId;

/// The Store and its subscriber registry
pub mod store;

/// Middleware trait, continuation and chain
pub mod middleware;

/// Ready-made middleware: logging, crash reporting, metrics
pub mod interceptors;

/// Cooperative cancellation signals
pub mod signal;

/// Async task lifecycle manager
pub mod lifecycle;

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use statehub_core::action::InvalidKind;
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// The dispatched action has no usable discriminator
        ///
        /// Raised synchronously from `dispatch`; the reducer never sees the action.
        #[error("Invalid action: {0}")]
        InvalidAction(#[from] InvalidKind),

        /// A reducer broke its contract
        ///
        /// This is a programmer error, e.g. a reducer that dispatches while
        /// it is computing the next state.
        #[error("Reducer contract violated: {0}")]
        ReducerViolation(String),

        /// Re-entrant dispatch nested deeper than the configured limit
        ///
        /// Usually a middleware or subscriber that dispatches unconditionally.
        #[error("Dispatch nesting exceeded the limit of {0}")]
        DispatchDepthExceeded(usize),

        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `dispatch()` is called after `close()`.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// A middleware failed
        ///
        /// Propagated to the caller of `dispatch` unchanged unless an earlier
        /// middleware catches it.
        #[error(transparent)]
        Middleware(#[from] anyhow::Error),

        /// An async task was started outside a Tokio runtime
        ///
        /// Raised by `TaskManager::run` before anything is dispatched.
        #[error("No Tokio runtime available to drive the task")]
        NoRuntime,

        /// A task join error occurred while waiting for an async operation
        ///
        /// Operation panics are reported as rejections, so this means
        /// dispatching a completion panicked or the runtime shut down.
        #[error("Task failed: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),
    }
}

/// Store configuration
///
/// # Example
///
/// ```
/// use statehub_runtime::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_name("checkout")
///     .with_max_dispatch_depth(16);
///
/// assert_eq!(config.name(), "checkout");
/// assert_eq!(config.max_dispatch_depth(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name recorded on tracing spans and metrics labels
    name: String,

    /// Maximum nesting of re-entrant dispatches
    max_dispatch_depth: usize,
}

impl StoreConfig {
    /// Create a new configuration with default settings
    ///
    /// Defaults:
    /// - `name`: `"store"`
    /// - `max_dispatch_depth`: 64
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "store".to_string(),
            max_dispatch_depth: 64,
        }
    }

    /// Set the store name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum re-entrant dispatch depth
    #[must_use]
    pub const fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    /// Store name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum re-entrant dispatch depth
    #[must_use]
    pub const fn max_dispatch_depth(&self) -> usize {
        self.max_dispatch_depth
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Request identities drawn at random
///
/// Distinct across task managers sharing a Store, with overwhelming
/// probability.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> RequestId {
        RequestId::new(rand::random())
    }
}

// Re-export for convenience
pub use error::StoreError;
pub use interceptors::{CrashReporter, LoggingMiddleware, MetricsMiddleware};
pub use lifecycle::{Condition, Operation, RunOptions, TaskHandle, TaskManager, TaskOutcome};
pub use middleware::{Middleware, MiddlewareChain, Next, middleware_fn};
pub use signal::{AbortController, AbortSignal};
pub use store::{Store, StoreBuilder, Subscription, WeakStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.name(), "store");
        assert_eq!(config.max_dispatch_depth(), 64);
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let ids = RandomIdGenerator;
        let first = ids.next_id();
        let second = ids.next_id();
        assert_ne!(first, second);
    }

    #[test]
    fn test_store_error_messages() {
        let error = StoreError::from(statehub_core::action::InvalidKind::Empty);
        assert_eq!(error.to_string(), "Invalid action: action kind is empty");

        let error = StoreError::from(anyhow::anyhow!("quota exceeded"));
        assert_eq!(error.to_string(), "quota exceeded");
    }
}

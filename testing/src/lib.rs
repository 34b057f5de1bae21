//! # Statehub Testing
//!
//! Testing utilities and helpers for statehub.
//!
//! This crate provides:
//! - Deterministic implementations of the environment traits
//! - A Given/When/Then harness and purity assertions for reducers
//! - Probes that record what flows through a Store
//! - Operations that tests resolve by hand, in any order
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use statehub_testing::{DeferredOperation, SequentialIdGenerator, test_clock};
//! use statehub_runtime::{RunOptions, Store, TaskManager};
//!
//! #[tokio::test]
//! async fn test_newest_request_wins() {
//!     let store = Store::new(UsersState::default(), UsersReducer);
//!     let tasks = TaskManager::builder(store.clone())
//!         .clock(test_clock())
//!         .id_generator(SequentialIdGenerator::new())
//!         .build();
//!
//!     let fetch = DeferredOperation::new();
//!     let first = tasks.run("users/fetchById", 1, fetch.clone(), RunOptions::new().with_reentry(true))?;
//!     let second = tasks.run("users/fetchById", 2, fetch.clone(), RunOptions::new().with_reentry(true))?;
//!
//!     fetch.resolve(1, user(2));
//!     fetch.resolve(0, user(1));
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use statehub_core::environment::{Clock, IdGenerator};
use statehub_core::task::RequestId;

mod deferred;
mod recording;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, RequestId, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use statehub_testing::mocks::FixedClock;
    /// use statehub_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Request identities 1, 2, 3, ...
    ///
    /// ```
    /// use statehub_testing::mocks::SequentialIdGenerator;
    /// use statehub_core::environment::IdGenerator;
    ///
    /// let ids = SequentialIdGenerator::new();
    /// assert_eq!(ids.next_id().get(), 1);
    /// assert_eq!(ids.next_id().get(), 2);
    /// ```
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        last: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start at 1
        #[must_use]
        pub const fn new() -> Self {
            Self::starting_after(0)
        }

        /// Start at `last + 1`
        #[must_use]
        pub const fn starting_after(last: u64) -> Self {
            Self {
                last: AtomicU64::new(last),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> RequestId {
            RequestId::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    pub use crate::deferred::DeferredOperation;
    pub use crate::recording::{RecordingMiddleware, SubscriberProbe};

    /// Route `tracing` output to the test harness
    ///
    /// Safe to call from every test; only the first call installs the
    /// subscriber. Honours `RUST_LOG`, defaulting to `debug`.
    pub fn init_test_tracing() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use statehub_core::AnyAction;

    /// Kinds shaped like `"domain/event"`
    pub fn action_kind() -> impl Strategy<Value = String> {
        "[a-z]{1,8}/[a-zA-Z]{1,12}"
    }

    /// Well-formed kinds not contained in `known`
    ///
    /// Use to check that a reducer passes unknown actions through unchanged.
    pub fn unknown_kind(known: &'static [&'static str]) -> impl Strategy<Value = String> {
        action_kind().prop_filter("kind must be unknown to the reducer", move |kind| {
            !known.contains(&kind.as_str())
        })
    }

    /// Kinds that the Store must reject: empty or whitespace only
    pub fn malformed_kind() -> impl Strategy<Value = String> {
        "[ \t\n]{0,4}"
    }

    /// Untyped actions with an optional numeric payload
    pub fn any_action() -> impl Strategy<Value = AnyAction> {
        (action_kind(), proptest::option::of(any::<i64>())).prop_map(|(kind, payload)| {
            let action = AnyAction::new(kind);
            match payload {
                Some(value) => action.with_payload(serde_json::json!(value)),
                None => action,
            }
        })
    }
}

// Re-export commonly used items
pub use deferred::DeferredOperation;
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
pub use recording::{RecordingMiddleware, SubscriberProbe};
pub use reducer_test::{ReducerTest, assertions};

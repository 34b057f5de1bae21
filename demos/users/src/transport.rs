//! A pretend user service
//!
//! Answers after a configurable delay so that requests can be made to
//! finish in any order. Honours the abort signal by giving up early.

use crate::User;
use rand::Rng;
use statehub_core::TaskError;
use statehub_runtime::AbortSignal;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`SimulatedTransport`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The service has no such user
    #[error("user {0} not found")]
    NotFound(u64),

    /// The caller gave up before the response arrived
    #[error("request aborted")]
    Aborted,
}

impl From<TransportError> for TaskError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::NotFound(_) => Self::new("TransportError", error.to_string()).with_code("NOT_FOUND"),
            TransportError::Aborted => Self::aborted(),
        }
    }
}

/// In-process stand-in for a remote user service
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    latency: Duration,
    per_user: HashMap<u64, Duration>,
    jitter: Duration,
    missing: HashSet<u64>,
    honour_abort: bool,
}

impl SimulatedTransport {
    /// Every request takes 50ms and succeeds
    #[must_use]
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(50),
            per_user: HashMap::new(),
            jitter: Duration::ZERO,
            missing: HashSet::new(),
            honour_abort: true,
        }
    }

    /// Default latency for every request
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Latency for requests about one user
    #[must_use]
    pub fn with_user_latency(mut self, id: u64, latency: Duration) -> Self {
        self.per_user.insert(id, latency);
        self
    }

    /// Add up to `jitter` of random extra latency
    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Respond `NotFound` for `id`
    #[must_use]
    pub fn without_user(mut self, id: u64) -> Self {
        self.missing.insert(id);
        self
    }

    /// Keep going after an abort, like a service that cannot be cancelled
    #[must_use]
    pub const fn ignoring_abort(mut self) -> Self {
        self.honour_abort = false;
        self
    }

    fn delay_for(&self, id: u64) -> Duration {
        let base = self.per_user.get(&id).copied().unwrap_or(self.latency);
        if self.jitter.is_zero() {
            return base;
        }
        let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }

    /// Fetch one user
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotFound`] for users configured as missing
    /// - [`TransportError::Aborted`] if `signal` fires first and aborts are honoured
    pub async fn fetch_user(&self, id: u64, signal: AbortSignal) -> Result<User, TransportError> {
        let delay = self.delay_for(id);
        tracing::debug!(id, delay_ms = delay.as_millis(), "Request sent");

        if self.honour_abort {
            tokio::select! {
                () = tokio::time::sleep(delay) => {},
                () = signal.aborted() => {
                    tracing::debug!(id, "Request aborted");
                    return Err(TransportError::Aborted);
                },
            }
        } else {
            tokio::time::sleep(delay).await;
        }

        if self.missing.contains(&id) {
            return Err(TransportError::NotFound(id));
        }
        tracing::debug!(id, "Response received");
        Ok(User::sample(id))
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

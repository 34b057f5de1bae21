//! Cooperative cancellation
//!
//! An [`AbortController`] owns the cancellation flag; the operation only gets
//! an [`AbortSignal`] to observe it. Aborting is one-way and idempotent.
//! Operations that ignore the signal still run to completion, but their
//! results are dropped by the task record.

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of a cancellation flag
#[derive(Debug, Clone)]
pub struct AbortController {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortController {
    /// Create a controller that has not been aborted
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation
    ///
    /// Returns `true` if this call changed the flag.
    pub fn abort(&self) -> bool {
        let was_aborted = self.tx.send_replace(true);
        if !was_aborted {
            tracing::debug!("Abort requested");
        }
        !was_aborted
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// A signal observing this controller
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation flag
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that is never aborted
    #[must_use]
    pub fn never() -> Self {
        AbortController::new().signal()
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    ///
    /// Never resolves if every controller is dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_abort_is_idempotent() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.is_aborted());

        assert!(controller.abort());
        assert!(!controller.abort());
        assert!(controller.is_aborted());
        assert!(signal.is_aborted());
    }

    #[test]
    fn test_signal_created_after_abort_sees_it() {
        let controller = AbortController::new();
        controller.abort();
        assert!(controller.signal().is_aborted());
    }

    #[tokio::test]
    async fn test_aborted_resolves() {
        let controller = AbortController::new();
        let signal = controller.signal();

        let waiter = tokio::spawn(async move { signal.aborted().await });
        tokio::task::yield_now().await;
        controller.abort();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_never_signal_stays_pending() {
        let signal = AbortSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(result.is_err());
    }
}

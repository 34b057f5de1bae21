//! Operations resolved by the test
//!
//! A [`DeferredOperation`] records each invocation and leaves it outstanding
//! until the test resolves or rejects it. Invocations can be settled in any
//! order, which is how tests reproduce responses arriving out of order.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use statehub_core::task::TaskError;
use statehub_runtime::{AbortSignal, Operation};
use std::sync::Arc;
use tokio::sync::oneshot;

struct Invocation<Arg, T> {
    arg: Arg,
    signal: AbortSignal,
    responder: Option<oneshot::Sender<Result<T, TaskError>>>,
}

/// An operation whose invocations complete when the test says so
///
/// Clones share the same invocation log.
pub struct DeferredOperation<Arg, T> {
    invocations: Arc<Mutex<Vec<Invocation<Arg, T>>>>,
}

impl<Arg, T> DeferredOperation<Arg, T> {
    /// Create an operation with no invocations
    #[must_use]
    pub fn new() -> Self {
        Self {
            invocations: Arc::default(),
        }
    }

    /// Number of times the operation was invoked
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.invocations.lock().len()
    }

    /// Argument of invocation `index` (0-based, in call order)
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<Arg>
    where
        Arg: Clone,
    {
        self.invocations.lock().get(index).map(|invocation| invocation.arg.clone())
    }

    /// Abort signal handed to invocation `index`
    #[must_use]
    pub fn signal(&self, index: usize) -> Option<AbortSignal> {
        self.invocations.lock().get(index).map(|invocation| invocation.signal.clone())
    }

    /// Complete invocation `index` with `value`
    ///
    /// Returns `false` if there is no such invocation or it was already settled.
    pub fn resolve(&self, index: usize, value: T) -> bool {
        self.settle(index, Ok(value))
    }

    /// Fail invocation `index` with `error`
    ///
    /// Returns `false` if there is no such invocation or it was already settled.
    pub fn reject(&self, index: usize, error: impl Into<TaskError>) -> bool {
        self.settle(index, Err(error.into()))
    }

    fn settle(&self, index: usize, result: Result<T, TaskError>) -> bool {
        let responder = self
            .invocations
            .lock()
            .get_mut(index)
            .and_then(|invocation| invocation.responder.take());

        responder.is_some_and(|responder| responder.send(result).is_ok())
    }
}

impl<Arg, T> Clone for DeferredOperation<Arg, T> {
    fn clone(&self) -> Self {
        Self {
            invocations: Arc::clone(&self.invocations),
        }
    }
}

impl<Arg, T> Default for DeferredOperation<Arg, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Arg, T> std::fmt::Debug for DeferredOperation<Arg, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredOperation")
            .field("calls", &self.call_count())
            .finish()
    }
}

impl<Arg, T> Operation<Arg, T> for DeferredOperation<Arg, T>
where
    Arg: Send + 'static,
    T: Send + 'static,
{
    fn call(&self, arg: Arg, signal: AbortSignal) -> BoxFuture<'static, Result<T, TaskError>> {
        let (tx, rx) = oneshot::channel();
        self.invocations.lock().push(Invocation {
            arg,
            signal,
            responder: Some(tx),
        });

        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(TaskError::new("DroppedError", "deferred operation was dropped")))
        })
    }
}

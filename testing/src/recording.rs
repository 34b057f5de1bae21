//! Probes that record what flows through a Store

use parking_lot::Mutex;
use statehub_core::action::Action;
use statehub_runtime::{Middleware, Next, Store, StoreError, Subscription};
use std::borrow::Cow;
use std::sync::Arc;

/// Middleware that records the kind of every action passing through
///
/// Clones share the same log, so keep one clone in the test and hand the
/// other to the Store builder.
#[derive(Debug, Clone, Default)]
pub struct RecordingMiddleware {
    kinds: Arc<Mutex<Vec<String>>>,
}

impl RecordingMiddleware {
    /// Create a recorder with an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds seen so far, in dispatch order
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.kinds.lock().clone()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.kinds.lock().clear();
    }
}

impl<S, A> Middleware<S, A> for RecordingMiddleware
where
    S: Send + Sync + 'static,
    A: Action,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("recording")
    }

    fn handle(&self, _store: &Store<S, A>, action: A, next: Next<'_, S, A>) -> Result<A, StoreError> {
        self.kinds.lock().push(action.kind().into_owned());
        next.run(action)
    }
}

/// Subscriber that keeps every snapshot it was notified with
pub struct SubscriberProbe<S> {
    snapshots: Arc<Mutex<Vec<Arc<S>>>>,
    subscription: Subscription,
}

impl<S> SubscriberProbe<S>
where
    S: Send + Sync + 'static,
{
    /// Subscribe to `store`
    ///
    /// The probe holds the Store weakly, so it does not keep it alive.
    pub fn attach<A: Action>(store: &Store<S, A>) -> Self {
        let snapshots: Arc<Mutex<Vec<Arc<S>>>> = Arc::default();
        let sink = Arc::clone(&snapshots);
        let weak = store.downgrade();

        let subscription = store.subscribe(move || {
            if let Some(store) = weak.upgrade() {
                sink.lock().push(store.get_state());
            }
        });

        Self {
            snapshots,
            subscription,
        }
    }

    /// Number of notifications received
    #[must_use]
    pub fn notifications(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Snapshots observed, oldest first
    #[must_use]
    pub fn snapshots(&self) -> Vec<Arc<S>> {
        self.snapshots.lock().clone()
    }

    /// The most recent snapshot observed
    #[must_use]
    pub fn last(&self) -> Option<Arc<S>> {
        self.snapshots.lock().last().cloned()
    }

    /// Project every observed snapshot through `f`
    pub fn values<T>(&self, f: impl Fn(&S) -> T) -> Vec<T> {
        self.snapshots.lock().iter().map(|snapshot| f(snapshot)).collect()
    }

    /// Stop receiving notifications
    pub fn detach(&self) -> bool {
        self.subscription.unsubscribe()
    }
}

impl<S> std::fmt::Debug for SubscriberProbe<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberProbe")
            .field("notifications", &self.snapshots.lock().len())
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use statehub_core::{AnyAction, Transition, reducer_fn};

    fn store() -> (Store<u32, AnyAction>, RecordingMiddleware) {
        let recorder = RecordingMiddleware::new();
        let reducer = reducer_fn(|state: &u32, action: &AnyAction| match action.kind.as_str() {
            "count/increment" => Transition::Updated(state + 1),
            _ => Transition::Unchanged,
        });
        let store = Store::builder(0, reducer).middleware(recorder.clone()).build();
        (store, recorder)
    }

    #[test]
    fn test_recording_middleware_logs_kinds() {
        let (store, recorder) = store();

        store.dispatch(AnyAction::new("count/increment")).unwrap();
        store.dispatch(AnyAction::new("count/other")).unwrap();

        assert_eq!(recorder.kinds(), vec!["count/increment", "count/other"]);
        recorder.clear();
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn test_probe_records_snapshots_until_detached() {
        let (store, _recorder) = store();
        let probe = SubscriberProbe::attach(&store);

        store.dispatch(AnyAction::new("count/increment")).unwrap();
        store.dispatch(AnyAction::new("count/other")).unwrap();

        assert_eq!(probe.values(|value| *value), vec![1, 1]);
        let snapshots = probe.snapshots();
        assert!(Arc::ptr_eq(&snapshots[0], &snapshots[1]));

        assert!(probe.detach());
        store.dispatch(AnyAction::new("count/increment")).unwrap();
        assert_eq!(probe.notifications(), 2);
        assert_eq!(probe.last().map(|s| *s), Some(1));
    }
}

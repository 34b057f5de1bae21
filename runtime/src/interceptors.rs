//! Ready-made middleware
//!
//! - [`LoggingMiddleware`]: `tracing` events around every dispatch
//! - [`CrashReporter`]: reports errors raised further down the chain
//! - [`MetricsMiddleware`]: per-kind counters and latency histograms
//!
//! Put `CrashReporter` first so it sees errors from every later link.

use crate::error::StoreError;
use crate::middleware::{Middleware, Next};
use crate::store::Store;
use statehub_core::action::Action;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tracing::Level;

/// Logs each action before it enters the rest of the chain and after it leaves
///
/// The "after" event records whether the state snapshot was replaced.
#[derive(Debug, Clone, Copy)]
pub struct LoggingMiddleware {
    level: Level,
}

impl LoggingMiddleware {
    /// Log at `DEBUG`
    #[must_use]
    pub const fn new() -> Self {
        Self { level: Level::DEBUG }
    }

    /// Log at `level` instead
    #[must_use]
    pub const fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::ERROR => tracing::error!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            _ => tracing::trace!($($arg)+),
        }
    };
}

impl<S, A> Middleware<S, A> for LoggingMiddleware
where
    S: Send + Sync + 'static,
    A: Action,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("logging")
    }

    fn handle(&self, store: &Store<S, A>, action: A, next: Next<'_, S, A>) -> Result<A, StoreError> {
        let kind = action.kind().into_owned();
        let before = store.get_state();
        event_at!(self.level, kind = %kind, "Dispatching action");

        let result = next.run(action);

        let changed = !Arc::ptr_eq(&before, &store.get_state());
        match &result {
            Ok(_) => event_at!(self.level, kind = %kind, changed, "Action dispatched"),
            Err(error) => event_at!(self.level, kind = %kind, error = %error, "Action failed"),
        }
        result
    }
}

type ReportFn = Arc<dyn Fn(&str, &StoreError) + Send + Sync>;

/// Reports errors raised by later links (or the terminal stage) and re-raises them
///
/// ```ignore
/// let reporter = CrashReporter::new(|kind, error| sentry.capture(kind, error));
/// ```
#[derive(Clone)]
pub struct CrashReporter {
    report: ReportFn,
}

impl CrashReporter {
    /// Report to `report(kind, error)`
    pub fn new<F>(report: F) -> Self
    where
        F: Fn(&str, &StoreError) + Send + Sync + 'static,
    {
        Self {
            report: Arc::new(report),
        }
    }

    /// Report to the log only
    #[must_use]
    pub fn logging() -> Self {
        Self::new(|_, _| {})
    }
}

impl std::fmt::Debug for CrashReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashReporter").finish_non_exhaustive()
    }
}

impl<S, A> Middleware<S, A> for CrashReporter
where
    S: Send + Sync + 'static,
    A: Action,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("crash_reporter")
    }

    fn handle(&self, _store: &Store<S, A>, action: A, next: Next<'_, S, A>) -> Result<A, StoreError> {
        let kind = action.kind().into_owned();
        next.run(action).inspect_err(|error| {
            tracing::error!(kind = %kind, error = %error, "Caught an error while dispatching");
            metrics::counter!("middleware.dispatch.crashes").increment(1);
            (self.report)(&kind, error);
        })
    }
}

/// Records a dispatch counter and a latency histogram labelled by action kind
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsMiddleware;

impl<S, A> Middleware<S, A> for MetricsMiddleware
where
    S: Send + Sync + 'static,
    A: Action,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("metrics")
    }

    fn handle(&self, _store: &Store<S, A>, action: A, next: Next<'_, S, A>) -> Result<A, StoreError> {
        let kind = action.kind().into_owned();
        let start = Instant::now();

        let result = next.run(action);

        let elapsed = start.elapsed().as_secs_f64();
        metrics::counter!("middleware.dispatch.total", "kind" => kind.clone()).increment(1);
        metrics::histogram!("middleware.dispatch.duration_seconds", "kind" => kind.clone()).record(elapsed);
        if result.is_err() {
            metrics::counter!("middleware.dispatch.errors", "kind" => kind).increment(1);
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::middleware::middleware_fn;
    use parking_lot::Mutex;
    use statehub_core::{AnyAction, Transition, reducer_fn};

    fn store_with<M>(first: M) -> Store<u32, AnyAction>
    where
        M: Middleware<u32, AnyAction> + 'static,
    {
        let reducer = reducer_fn(|state: &u32, action: &AnyAction| match action.kind.as_str() {
            "count/increment" => Transition::Updated(state + 1),
            _ => Transition::Unchanged,
        });
        Store::builder(0, reducer)
            .middleware(first)
            .middleware(middleware_fn(|_store: &Store<u32, AnyAction>, action: AnyAction, next| {
                if action.kind == "count/forbidden" {
                    return Err(anyhow::anyhow!("forbidden action").into());
                }
                next.run(action)
            }))
            .build()
    }

    #[test]
    fn test_crash_reporter_reports_and_rethrows() {
        let reports: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
        let sink = Arc::clone(&reports);
        let store = store_with(CrashReporter::new(move |kind, error| {
            sink.lock().push((kind.to_string(), error.to_string()));
        }));

        let error = store.dispatch(AnyAction::new("count/forbidden")).unwrap_err();

        assert_eq!(error.to_string(), "forbidden action");
        assert_eq!(
            *reports.lock(),
            vec![("count/forbidden".to_string(), "forbidden action".to_string())]
        );
    }

    #[test]
    fn test_crash_reporter_is_silent_on_success() {
        let reports: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&reports);
        let store = store_with(CrashReporter::new(move |kind, _| sink.lock().push(kind.to_string())));

        store.dispatch(AnyAction::new("count/increment")).unwrap();

        assert!(reports.lock().is_empty());
        assert_eq!(*store.get_state(), 1);
    }

    #[test]
    fn test_logging_middleware_passes_through() {
        let store = store_with(LoggingMiddleware::new().with_level(Level::INFO));

        let returned = store.dispatch(AnyAction::new("count/increment")).unwrap();
        store.dispatch(AnyAction::new("count/unrelated")).unwrap();

        assert_eq!(returned.kind, "count/increment");
        assert_eq!(*store.get_state(), 1);
        assert!(store.dispatch(AnyAction::new("count/forbidden")).is_err());
    }

    #[test]
    fn test_metrics_middleware_passes_through() {
        let store = store_with(MetricsMiddleware);

        store.dispatch(AnyAction::new("count/increment")).unwrap();
        store.dispatch(AnyAction::new("count/increment")).unwrap();

        assert_eq!(*store.get_state(), 2);
    }

    #[test]
    fn test_names() {
        assert_eq!(Middleware::<u32, AnyAction>::name(&LoggingMiddleware::new()), "logging");
        assert_eq!(Middleware::<u32, AnyAction>::name(&CrashReporter::logging()), "crash_reporter");
        assert_eq!(Middleware::<u32, AnyAction>::name(&MetricsMiddleware), "metrics");
    }
}

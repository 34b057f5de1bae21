//! Counter example binary
//!
//! Demonstrates a statehub Store with middleware, a subscriber and metrics.

use counter::{CounterAction, CounterReducer, CounterState, NonNegative};
use statehub_runtime::metrics::MetricsExporter;
use statehub_runtime::{CrashReporter, LoggingMiddleware, MetricsMiddleware, Store, StoreConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,statehub_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut exporter = MetricsExporter::new();
    exporter.install()?;

    println!("=== Counter Example: statehub ===\n");

    let store = Store::builder(CounterState::default(), CounterReducer::new())
        .config(StoreConfig::default().with_name("counter"))
        .middleware(CrashReporter::new(|kind, error| {
            eprintln!("!!! {kind} failed: {error}");
        }))
        .middleware(LoggingMiddleware::new())
        .middleware(MetricsMiddleware)
        .middleware(NonNegative)
        .build();

    let watcher = store.downgrade();
    let subscription = store.subscribe(move || {
        if let Some(store) = watcher.upgrade() {
            println!("    [subscriber] count is now {}", store.state(|s| s.count));
        }
    });

    println!("Initial count: {}", store.state(|s| s.count));

    for action in [
        CounterAction::Increment,
        CounterAction::Increment,
        CounterAction::Increment,
        CounterAction::Decrement,
        CounterAction::Add(10),
        CounterAction::Add(-100),
        CounterAction::Reset,
        CounterAction::Decrement,
    ] {
        println!("\n>>> Dispatching: {action:?}");
        store.dispatch(action)?;
        println!("Count: {}", store.state(|s| s.count));
    }

    subscription.unsubscribe();
    store.close();

    println!("\n=== Demonstration Complete ===");
    println!("\nKey concepts demonstrated:");
    println!("  • State: CounterState (immutable snapshots)");
    println!("  • Action: CounterAction (tagged events)");
    println!("  • Reducer: Pure function (state, action) → transition");
    println!("  • Middleware: logging, metrics, crash reporting, a policy that short-circuits");
    println!("  • Store: Serialized dispatch with synchronous subscribers");

    if let Some(metrics) = exporter.render() {
        println!("\n=== Metrics ===\n{metrics}");
    }

    Ok(())
}

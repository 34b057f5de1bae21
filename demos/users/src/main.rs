//! Users example binary
//!
//! Walks through the task lifecycle: responses arriving out of order,
//! de-duplication of concurrent requests, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use statehub_runtime::{AbortController, RunOptions, TaskManager, TaskOutcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use users::{FETCH_USER, SimulatedTransport, fetch_user, users_store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "users=debug,statehub_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Users Example: statehub task lifecycle ===\n");

    out_of_order().await?;
    deduplicated().await?;
    cancelled().await?;

    println!("\n=== Demonstration Complete ===");
    Ok(())
}

/// Request user 1 (slow) then user 2 (fast); user 1's late answer is dropped
async fn out_of_order() -> anyhow::Result<()> {
    println!(">>> Out-of-order responses");

    let store = users_store();
    let tasks = TaskManager::new(store.clone());
    let transport = Arc::new(
        SimulatedTransport::new()
            .with_user_latency(1, Duration::from_millis(200))
            .with_user_latency(2, Duration::from_millis(20)),
    );

    let reentrant = || RunOptions::new().with_reentry(true);
    let slow = fetch_user(&tasks, &transport, 1, reentrant())?;
    let fast = fetch_user(&tasks, &transport, 2, reentrant())?;

    for handle in [fast, slow].into_iter().flatten() {
        let request_id = handle.request_id();
        let outcome = handle.outcome().await?;
        println!("    {request_id} finished: {}", describe(&outcome));
    }

    let state = store.get_state();
    println!("    result: {:?}", state.fetch.result);
    println!("    stale responses dropped: {}", state.fetch.stale_dropped);
    println!("    state: {}", serde_json::to_string_pretty(&*state)?);
    Ok(())
}

/// Two requests while one is pending: the second is skipped
async fn deduplicated() -> anyhow::Result<()> {
    println!("\n>>> De-duplication");

    let store = users_store();
    let tasks = TaskManager::new(store.clone());
    let transport = Arc::new(SimulatedTransport::new().with_jitter(Duration::from_millis(30)));

    let first = fetch_user(&tasks, &transport, 7, RunOptions::new())?;
    let second = fetch_user(&tasks, &transport, 7, RunOptions::new())?;
    println!("    first started: {}", first.is_some());
    println!("    second started: {}", second.is_some());

    // Already cached users are not fetched again
    if let Some(handle) = first {
        handle.outcome().await?;
    }
    let cached = fetch_user(
        &tasks,
        &transport,
        7,
        RunOptions::new().with_condition(|state: &users::UsersState, id: &u64| (!state.users.contains_key(id)).into()),
    )?;
    println!("    fetch of cached user started: {}", cached.is_some());
    Ok(())
}

/// Cancel a slow request through an external signal
async fn cancelled() -> anyhow::Result<()> {
    println!("\n>>> Cancellation");

    let store = users_store();
    let tasks = TaskManager::new(store.clone());
    let transport = Arc::new(SimulatedTransport::new().with_latency(Duration::from_secs(5)));
    let controller = AbortController::new();

    let handle = fetch_user(
        &tasks,
        &transport,
        3,
        RunOptions::new().with_signal(controller.signal()),
    )?;
    println!("    pending: {}", tasks.is_pending(FETCH_USER));

    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.abort();

    if let Some(handle) = handle {
        println!("    outcome: {}", describe(&handle.outcome().await?));
    }
    println!("    pending: {}", tasks.is_pending(FETCH_USER));
    println!("    status: {}", store.state(|s| s.fetch.status));
    Ok(())
}

fn describe<T: std::fmt::Debug>(outcome: &TaskOutcome<T>) -> String {
    match outcome {
        TaskOutcome::Fulfilled(value) => format!("fulfilled with {value:?}"),
        TaskOutcome::Rejected(error) => format!("rejected: {error}"),
        TaskOutcome::Aborted => "aborted".to_string(),
    }
}

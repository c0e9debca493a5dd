use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use dbqueue_core::{NewJob, Queue, DEFAULT_CHANNEL};
use dbqueue_runner::listener::NotificationListener;
use dbqueue_runner::run_event::RunEvent;

fn liveness_handle() -> health::HealthHandle {
    health::HealthRegistry::new("liveness")
        .register("notification-listener".to_string(), time::Duration::seconds(60))
}

#[sqlx::test(migrations = "../dbqueue-core/migrations")]
async fn test_enqueue_wakes_the_listener(db: PgPool) {
    let run_event = Arc::new(RunEvent::new());
    let shutdown = CancellationToken::new();

    let listener = NotificationListener::new_from_pool(
        db.clone(),
        DEFAULT_CHANNEL,
        run_event.clone(),
        shutdown.clone(),
        liveness_handle(),
    );
    let handle = tokio::spawn(async move { listener.run().await });

    // Enqueueing emits a notification on the channel. Retry until the
    // listener has its subscription up: a notify sent before LISTEN takes
    // effect is dropped, which is exactly the advisory contract.
    let queue = Queue::from_pool(db, DEFAULT_CHANNEL);
    for _ in 0..100 {
        if run_event.is_set() {
            break;
        }
        queue
            .enqueue(NewJob::new("tasks.echo"))
            .await
            .expect("failed to enqueue");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(run_event.is_set(), "listener never set the run event");

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener did not stop in time")
        .expect("listener task panicked")
        .expect("listener failed");
}

#[sqlx::test(migrations = "../dbqueue-core/migrations")]
async fn test_listener_stops_on_shutdown(db: PgPool) {
    let run_event = Arc::new(RunEvent::new());
    let shutdown = CancellationToken::new();

    let listener = NotificationListener::new_from_pool(
        db,
        DEFAULT_CHANNEL,
        run_event.clone(),
        shutdown.clone(),
        liveness_handle(),
    );
    let handle = tokio::spawn(async move { listener.run().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener did not stop in time")
        .expect("listener task panicked")
        .expect("listener failed");

    // No notification ever arrived, so the event was never set.
    assert!(!run_event.is_set());
}

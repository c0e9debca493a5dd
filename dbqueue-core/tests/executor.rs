use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;

use dbqueue_core::{
    claim_one, AttemptOutcome, Handler, HandlerError, Kwargs, NewJob, Queue, ResultError,
    RetryPolicy, DEFAULT_CHANNEL,
};

mod common;
use common::{drain, run_one, test_registry};

#[sqlx::test(migrations = "./migrations")]
async fn test_successful_execution_round_trips_arguments(db: PgPool) {
    let queue = Queue::from_pool(db.clone(), DEFAULT_CHANNEL);
    let job_id = queue
        .enqueue(
            NewJob::new("tasks.echo")
                .arg(1)
                .kwarg("a", "b")
                .kwarg("c", "d"),
        )
        .await
        .expect("failed to enqueue");

    let registry = test_registry();
    let outcome = run_one(&db, &registry, &RetryPolicy::default())
        .await
        .expect("no job executed");
    assert_eq!(outcome, AttemptOutcome::Completed);

    let result = queue.get_result(job_id).await.expect("job did not succeed");
    assert_eq!(
        result,
        json!({ "args": [1], "kwargs": { "a": "b", "c": "d" } })
    );

    // The successful attempt is the final result; nothing is claimable.
    let results = queue.results_for(job_id).await.expect("failed to fetch");
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert!(results[0].finished_at >= results[0].started_at);

    let job = queue
        .get_job(job_id)
        .await
        .expect("failed to fetch job")
        .expect("job not found");
    assert_eq!(job.final_result_id, Some(results[0].id));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_get_result_before_execution_is_unfinished(db: PgPool) {
    let queue = Queue::from_pool(db.clone(), DEFAULT_CHANNEL);
    let job_id = queue
        .enqueue(NewJob::new("tasks.echo"))
        .await
        .expect("failed to enqueue");

    match queue.get_result(job_id).await {
        Err(ResultError::Unfinished(id)) => assert_eq!(id, job_id),
        other => panic!("expected Unfinished, got {other:?}"),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_unresolved_handler_fails_permanently(db: PgPool) {
    let queue = Queue::from_pool(db.clone(), DEFAULT_CHANNEL);
    // A generous retry budget must not matter: unknown handlers are never
    // retried.
    let job_id = queue
        .enqueue(NewJob::new("does.not.exist").max_retries(5))
        .await
        .expect("failed to enqueue");

    let registry = test_registry();
    let outcome = run_one(&db, &registry, &RetryPolicy::default())
        .await
        .expect("no job executed");
    assert_eq!(outcome, AttemptOutcome::Unresolved);

    assert_eq!(
        queue.attempt_count(job_id).await.expect("failed to count"),
        1
    );
    assert!(run_one(&db, &registry, &RetryPolicy::default())
        .await
        .is_none());

    match queue.get_result(job_id).await {
        Err(ResultError::PermanentFailure { exception, .. }) => {
            assert!(exception.contains("does.not.exist"));
        }
        other => panic!("expected PermanentFailure, got {other:?}"),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_max_retries_zero_means_one_attempt(db: PgPool) {
    let queue = Queue::from_pool(db.clone(), DEFAULT_CHANNEL);
    let job_id = queue
        .enqueue(NewJob::new("tasks.boom").retry_delay(Duration::ZERO))
        .await
        .expect("failed to enqueue");

    let registry = test_registry();
    let outcomes = drain(&db, &registry, &RetryPolicy::default()).await;
    assert_eq!(outcomes, vec![AttemptOutcome::Exhausted]);

    let results = queue.results_for(job_id).await.expect("failed to fetch");
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);

    let job = queue
        .get_job(job_id)
        .await
        .expect("failed to fetch job")
        .expect("job not found");
    assert_eq!(job.final_result_id, Some(results[0].id));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_retry_exhaustion_records_every_attempt(db: PgPool) {
    let queue = Queue::from_pool(db.clone(), DEFAULT_CHANNEL);
    let job_id = queue
        .enqueue(
            NewJob::new("tasks.boom")
                .max_retries(2)
                .retry_delay(Duration::ZERO),
        )
        .await
        .expect("failed to enqueue");

    let registry = test_registry();
    let outcomes = drain(&db, &registry, &RetryPolicy::default()).await;
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0], AttemptOutcome::Retried(_)));
    assert!(matches!(outcomes[1], AttemptOutcome::Retried(_)));
    assert_eq!(outcomes[2], AttemptOutcome::Exhausted);

    let results = queue.results_for(job_id).await.expect("failed to fetch");
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| !r.success));
    assert!(results.iter().all(|r| r.exception == "boom"));

    // Only the last attempt terminates the job.
    let job = queue
        .get_job(job_id)
        .await
        .expect("failed to fetch job")
        .expect("job not found");
    assert_eq!(job.final_result_id, Some(results[2].id));

    match queue.get_result(job_id).await {
        Err(ResultError::PermanentFailure { exception, .. }) => assert_eq!(exception, "boom"),
        other => panic!("expected PermanentFailure, got {other:?}"),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_failure_pushes_eligibility_into_the_future(db: PgPool) {
    let queue = Queue::from_pool(db.clone(), DEFAULT_CHANNEL);
    let job_id = queue
        .enqueue(
            NewJob::new("tasks.boom")
                .max_retries(3)
                .retry_delay(Duration::from_secs(3600)),
        )
        .await
        .expect("failed to enqueue");

    let registry = test_registry();
    let before = Utc::now();
    let outcome = run_one(&db, &registry, &RetryPolicy::default())
        .await
        .expect("no job executed");

    let AttemptOutcome::Retried(until) = outcome else {
        panic!("expected Retried, got {outcome:?}");
    };
    assert!(until > before + chrono::Duration::minutes(59));

    let job = queue
        .get_job(job_id)
        .await
        .expect("failed to fetch job")
        .expect("job not found");
    assert_eq!(job.error_delay_until, Some(until));

    // Not claimable again until the back-off elapses.
    let mut tx = db.begin().await.expect("failed to begin");
    assert!(claim_one(&mut *tx)
        .await
        .expect("failed to claim")
        .is_none());
}

#[derive(Debug)]
struct FlakyHandler {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Handler for FlakyHandler {
    async fn call(&self, _args: Vec<Value>, _kwargs: Kwargs) -> Result<Value, HandlerError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(HandlerError::msg("transient"))
        } else {
            Ok(json!("recovered"))
        }
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_success_after_retry_is_final(db: PgPool) {
    let queue = Queue::from_pool(db.clone(), DEFAULT_CHANNEL);
    let job_id = queue
        .enqueue(
            NewJob::new("tasks.flaky")
                .max_retries(2)
                .retry_delay(Duration::ZERO),
        )
        .await
        .expect("failed to enqueue");

    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = test_registry();
    registry.register(
        "tasks.flaky",
        Arc::new(FlakyHandler {
            calls: calls.clone(),
        }),
    );

    let outcomes = drain(&db, &registry, &RetryPolicy::default()).await;
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], AttemptOutcome::Retried(_)));
    assert_eq!(outcomes[1], AttemptOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let result = queue.get_result(job_id).await.expect("job did not succeed");
    assert_eq!(result, json!("recovered"));

    // The failing attempt is kept for the record; the successful one is
    // final.
    let results = queue.results_for(job_id).await.expect("failed to fetch");
    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert!(results[1].success);

    let job = queue
        .get_job(job_id)
        .await
        .expect("failed to fetch job")
        .expect("job not found");
    assert_eq!(job.final_result_id, Some(results[1].id));
}

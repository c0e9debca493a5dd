use serde_json::json;
use sqlx::PgPool;

use dbqueue_core::{
    claim_one, execute_job, AttemptOutcome, HandlerError, HandlerRegistry, RetryPolicy,
};

/// A registry with one handler that echoes its inputs and one that always
/// fails, which is enough to drive every execution path.
#[allow(dead_code)]
pub fn test_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register_fn("tasks.echo", |args, kwargs| async move {
        Ok(json!({ "args": args, "kwargs": kwargs }))
    });

    registry.register_fn("tasks.boom", |_args, _kwargs| async move {
        Err::<serde_json::Value, _>(HandlerError::msg("boom"))
    });

    registry
}

/// Claim and execute at most one job the way a runner does: one
/// transaction wrapping both the claim and the result writes.
#[allow(dead_code)]
pub async fn run_one(
    pool: &PgPool,
    registry: &HandlerRegistry,
    retry_policy: &RetryPolicy,
) -> Option<AttemptOutcome> {
    let mut tx = pool.begin().await.expect("failed to begin transaction");

    let job = claim_one(&mut *tx).await.expect("failed to claim")?;
    let outcome = execute_job(&mut tx, &job, registry, retry_policy)
        .await
        .expect("failed to execute job");

    tx.commit().await.expect("failed to commit");
    Some(outcome)
}

/// Drain the queue fully, returning each attempt's outcome in order.
#[allow(dead_code)]
pub async fn drain(
    pool: &PgPool,
    registry: &HandlerRegistry,
    retry_policy: &RetryPolicy,
) -> Vec<AttemptOutcome> {
    let mut outcomes = Vec::new();
    while let Some(outcome) = run_one(pool, registry, retry_policy).await {
        outcomes.push(outcome);
    }
    outcomes
}

use crate::error::QueueError;
use crate::types::Job;

/// Claim the single most eligible job, locking its row for the duration of
/// the caller's transaction.
///
/// The query uses a FOR UPDATE SKIP LOCKED clause so that concurrent
/// claimants partition the queue instead of waiting on each other's locks.
/// For more details on this see:
/// 2ndquadrant.com/en/blog/what-is-select-skip-locked-for-in-postgresql-9-5.
///
/// A job is eligible when it has no final result, is not canceled, and any
/// `delay_until` / `error_delay_until` constraint has passed. Eligible jobs
/// are ordered by priority (lower value first), then by their delay
/// columns, matching the dispatch order the store promises.
pub async fn claim_one<'c, E>(executor: E) -> Result<Option<Job>, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let base_query = r#"
SELECT
    id,
    func_name,
    queued_at,
    priority,
    delay_until,
    error_delay_until,
    max_retries,
    retry_delay_ms,
    final_result_id,
    canceled
FROM
    dbqueue_jobs
WHERE
    final_result_id IS NULL
    AND canceled = FALSE
    AND (delay_until IS NULL OR delay_until <= NOW())
    AND (error_delay_until IS NULL OR error_delay_until <= NOW())
ORDER BY
    priority,
    delay_until,
    error_delay_until
LIMIT 1
FOR UPDATE SKIP LOCKED
    "#;

    sqlx::query_as(base_query)
        .fetch_optional(executor)
        .await
        .map_err(QueueError::query("SELECT"))
}

/// Fetch a job row by id, without locking it. Used by result accessors and
/// tests; the claim path always goes through [`claim_one`].
pub async fn get_job<'c, E>(executor: E, job_id: i64) -> Result<Option<Job>, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_as(
        r#"
SELECT
    id,
    func_name,
    queued_at,
    priority,
    delay_until,
    error_delay_until,
    max_retries,
    retry_delay_ms,
    final_result_id,
    canceled
FROM
    dbqueue_jobs
WHERE
    id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(executor)
    .await
    .map_err(QueueError::query("SELECT"))
}

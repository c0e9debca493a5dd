use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::QueueError;
use crate::types::{JobId, JobResult};

/// The columns of one attempt's outcome, written as a single append-only row.
pub struct NewResult<'a> {
    pub job_id: JobId,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exception: &'a str,
    pub traceback: &'a str,
    pub result: Option<&'a Value>,
}

pub async fn insert_result<'c, E>(executor: E, row: NewResult<'_>) -> Result<i64, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_scalar(
        r#"
INSERT INTO dbqueue_job_results
    (job_id, success, started_at, finished_at, exception, traceback, result)
VALUES
    ($1, $2, $3, $4, $5, $6, $7)
RETURNING
    id
        "#,
    )
    .bind(row.job_id)
    .bind(row.success)
    .bind(row.started_at)
    .bind(row.finished_at)
    .bind(row.exception)
    .bind(row.traceback)
    .bind(row.result)
    .fetch_one(executor)
    .await
    .map_err(QueueError::query("INSERT"))
}

/// The attempt count of a job is the number of result rows referencing it.
pub async fn count_results<'c, E>(executor: E, job_id: JobId) -> Result<i64, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM dbqueue_job_results WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(executor)
        .await
        .map_err(QueueError::query("SELECT"))
}

/// Terminate a job by pointing it at one of its result rows. Once set, the
/// claim query never returns the job again.
pub async fn set_final_result<'c, E>(
    executor: E,
    job_id: JobId,
    result_id: i64,
) -> Result<(), QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query("UPDATE dbqueue_jobs SET final_result_id = $2 WHERE id = $1")
        .bind(job_id)
        .bind(result_id)
        .execute(executor)
        .await
        .map_err(QueueError::query("UPDATE"))?;

    Ok(())
}

/// Push the job's eligibility into the future after a failed attempt.
pub async fn set_error_delay_until<'c, E>(
    executor: E,
    job_id: JobId,
    until: DateTime<Utc>,
) -> Result<(), QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query("UPDATE dbqueue_jobs SET error_delay_until = $2 WHERE id = $1")
        .bind(job_id)
        .bind(until)
        .execute(executor)
        .await
        .map_err(QueueError::query("UPDATE"))?;

    Ok(())
}

/// Mark a job canceled so it is never dispatched. Returns false if the job
/// does not exist. Cancellation does not interrupt an attempt already
/// running; it only suppresses future claims.
pub async fn cancel_job<'c, E>(executor: E, job_id: JobId) -> Result<bool, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let result = sqlx::query("UPDATE dbqueue_jobs SET canceled = TRUE WHERE id = $1")
        .bind(job_id)
        .execute(executor)
        .await
        .map_err(QueueError::query("UPDATE"))?;

    Ok(result.rows_affected() > 0)
}

/// Fetch every recorded attempt for a job, oldest first.
pub async fn results_for<'c, E>(executor: E, job_id: JobId) -> Result<Vec<JobResult>, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_as(
        r#"
SELECT
    id,
    job_id,
    success,
    started_at,
    finished_at,
    exception,
    traceback,
    result
FROM
    dbqueue_job_results
WHERE
    job_id = $1
ORDER BY
    id
        "#,
    )
    .bind(job_id)
    .fetch_all(executor)
    .await
    .map_err(QueueError::query("SELECT"))
}

/// Fetch the result row that terminated a job, if it is terminal.
pub async fn get_final_result<'c, E>(
    executor: E,
    job_id: JobId,
) -> Result<Option<JobResult>, QueueError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_as(
        r#"
SELECT
    r.id,
    r.job_id,
    r.success,
    r.started_at,
    r.finished_at,
    r.exception,
    r.traceback,
    r.result
FROM
    dbqueue_job_results r
JOIN
    dbqueue_jobs j ON j.final_result_id = r.id
WHERE
    j.id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(executor)
    .await
    .map_err(QueueError::query("SELECT"))
}

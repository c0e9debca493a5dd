use sqlx::PgConnection;

use crate::error::QueueError;
use crate::types::{JobId, NewJob};

/// Create a job row together with all of its argument rows.
///
/// Runs on the caller's connection, which is expected to hold an open
/// transaction: the job, its arguments, and the wake-up notification must
/// land atomically or not at all.
pub async fn create_job(
    conn: &mut PgConnection,
    job: &NewJob,
    channel: &str,
) -> Result<JobId, QueueError> {
    let base_query = r#"
INSERT INTO dbqueue_jobs
    (func_name, queued_at, priority, delay_until, max_retries, retry_delay_ms)
VALUES
    ($1, NOW(), $2, $3, $4, $5)
RETURNING
    id
    "#;

    let job_id: JobId = sqlx::query_scalar(base_query)
        .bind(&job.func_name)
        .bind(job.options.priority)
        .bind(job.options.delay_until)
        .bind(job.options.max_retries)
        .bind(job.retry_delay_ms())
        .fetch_one(&mut *conn)
        .await
        .map_err(QueueError::query("INSERT"))?;

    for (position, arg) in job.args.iter().enumerate() {
        sqlx::query(
            r#"
INSERT INTO dbqueue_job_args
    (job_id, position, arg)
VALUES
    ($1, $2, $3)
            "#,
        )
        .bind(job_id)
        .bind(position as i16)
        .bind(arg)
        .execute(&mut *conn)
        .await
        .map_err(QueueError::query("INSERT"))?;
    }

    for (param_name, arg) in &job.kwargs {
        sqlx::query(
            r#"
INSERT INTO dbqueue_job_kwargs
    (job_id, param_name, arg)
VALUES
    ($1, $2, $3)
            "#,
        )
        .bind(job_id)
        .bind(param_name)
        .bind(arg)
        .execute(&mut *conn)
        .await
        .map_err(QueueError::query("INSERT"))?;
    }

    notify(conn, channel).await?;

    Ok(job_id)
}

/// Emit a wake-up on the configured channel. The payload is empty on
/// purpose: listeners coalesce notifications into a single "there may be
/// work" signal and never inspect individual messages.
pub async fn notify(conn: &mut PgConnection, channel: &str) -> Result<(), QueueError> {
    sqlx::query("SELECT pg_notify($1, '')")
        .bind(channel)
        .execute(conn)
        .await
        .map_err(QueueError::query("NOTIFY"))?;

    Ok(())
}

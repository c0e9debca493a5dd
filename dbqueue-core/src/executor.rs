use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{info, warn};

use crate::error::QueueError;
use crate::metrics_consts::{JOBS_COMPLETED, JOBS_EXHAUSTED, JOBS_RETRIED, JOBS_UNRESOLVED};
use crate::ops::args::{load_args, load_kwargs};
use crate::ops::results::{
    count_results, insert_result, set_error_delay_until, set_final_result, NewResult,
};
use crate::registry::HandlerRegistry;
use crate::retry::RetryPolicy;
use crate::types::{to_chrono_duration, Job};

/// How a single attempt at a job concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The handler returned a value. The job is terminal.
    Completed,
    /// The job names a handler nobody registered. The job is failed
    /// permanently on the first attempt, regardless of its retry budget.
    Unresolved,
    /// The handler failed with retries remaining; the job becomes eligible
    /// again at the contained instant.
    Retried(DateTime<Utc>),
    /// The handler failed and the retry budget is spent. The job is terminal.
    Exhausted,
}

/// Run one claimed job and record the outcome.
///
/// Everything here happens on the connection that claimed the job, inside
/// the caller's transaction: the result row, any `error_delay_until` push,
/// and the final-result pointer all commit together with the claim, so a
/// row either finishes an attempt completely or reverts to its pre-claim
/// state when the transaction dies.
pub async fn execute_job(
    conn: &mut PgConnection,
    job: &Job,
    registry: &HandlerRegistry,
    retry_policy: &RetryPolicy,
) -> Result<AttemptOutcome, QueueError> {
    let started_at = Utc::now();

    let handler = match registry.resolve(&job.func_name) {
        Ok(handler) => handler,
        Err(unresolved) => {
            let exception = unresolved.to_string();
            warn!(
                job_id = job.id,
                func_name = %job.func_name,
                "failing job permanently: {}", exception
            );

            let result_id = insert_result(
                &mut *conn,
                NewResult {
                    job_id: job.id,
                    success: false,
                    started_at,
                    finished_at: Utc::now(),
                    exception: &exception,
                    traceback: "",
                    result: None,
                },
            )
            .await?;
            set_final_result(&mut *conn, job.id, result_id).await?;

            metrics::counter!(JOBS_UNRESOLVED).increment(1);
            return Ok(AttemptOutcome::Unresolved);
        }
    };

    let args = load_args(&mut *conn, job.id).await?;
    let kwargs = load_kwargs(&mut *conn, job.id).await?;

    match handler.call(args, kwargs).await {
        Ok(value) => {
            let result_id = insert_result(
                &mut *conn,
                NewResult {
                    job_id: job.id,
                    success: true,
                    started_at,
                    finished_at: Utc::now(),
                    exception: "",
                    traceback: "",
                    result: Some(&value),
                },
            )
            .await?;
            set_final_result(&mut *conn, job.id, result_id).await?;

            metrics::counter!(JOBS_COMPLETED).increment(1);
            info!(job_id = job.id, func_name = %job.func_name, "job completed");
            Ok(AttemptOutcome::Completed)
        }
        Err(failure) => {
            let finished_at = Utc::now();
            let result_id = insert_result(
                &mut *conn,
                NewResult {
                    job_id: job.id,
                    success: false,
                    started_at,
                    finished_at,
                    exception: &failure.message,
                    traceback: &failure.traceback,
                    result: None,
                },
            )
            .await?;

            // The attempt count includes the row we just wrote.
            let attempt_count = count_results(&mut *conn, job.id).await?;

            if attempt_count > i64::from(job.max_retries) {
                set_final_result(&mut *conn, job.id, result_id).await?;

                metrics::counter!(JOBS_EXHAUSTED).increment(1);
                warn!(
                    job_id = job.id,
                    func_name = %job.func_name,
                    attempt = attempt_count,
                    "job failed permanently: {}", failure.message
                );
                Ok(AttemptOutcome::Exhausted)
            } else {
                let backoff = retry_policy
                    .time_until_next_retry(job.retry_delay(), attempt_count.max(0) as u32);
                let until = finished_at + to_chrono_duration(backoff);
                set_error_delay_until(&mut *conn, job.id, until).await?;

                metrics::counter!(JOBS_RETRIED).increment(1);
                warn!(
                    job_id = job.id,
                    func_name = %job.func_name,
                    attempt = attempt_count,
                    retry_at = %until,
                    "job failed, retry scheduled: {}", failure.message
                );
                Ok(AttemptOutcome::Retried(until))
            }
        }
    }
}

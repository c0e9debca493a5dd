use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{pool::PoolOptions, PgPool};

use crate::error::{QueueError, ResultError};
use crate::metrics_consts::JOBS_ENQUEUED;
use crate::ops;
use crate::types::{Job, JobId, JobResult, NewJob};

/// A pool config object, designed to be passable across API boundaries
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    pub db_url: String,
    pub max_connections: Option<u32>,         // Default to 10
    pub min_connections: Option<u32>,         // Default to 1
    pub acquire_timeout_seconds: Option<u64>, // Default to 30
    pub max_lifetime_seconds: Option<u64>,    // Default to 300
    pub idle_timeout_seconds: Option<u64>,    // Default to 60
}

impl PoolConfig {
    pub fn new(db_url: &str) -> Self {
        Self {
            db_url: db_url.to_owned(),
            max_connections: None,
            min_connections: None,
            acquire_timeout_seconds: None,
            max_lifetime_seconds: None,
            idle_timeout_seconds: None,
        }
    }

    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        let builder = PoolOptions::new()
            .max_connections(self.max_connections.unwrap_or(10))
            .min_connections(self.min_connections.unwrap_or(1))
            .max_lifetime(Duration::from_secs(
                self.max_lifetime_seconds.unwrap_or(300),
            ))
            .idle_timeout(Duration::from_secs(self.idle_timeout_seconds.unwrap_or(60)))
            .acquire_timeout(Duration::from_secs(
                self.acquire_timeout_seconds.unwrap_or(30),
            ));

        builder.connect(&self.db_url).await
    }
}

/// A handle to the job store: a connection pool plus the notification
/// channel jobs are announced on.
///
/// `Queue` owns the producer surface (enqueue, cancel, result accessors).
/// The claim and execution path works on raw transactions instead, so the
/// runner can wrap a claim and its result writes in a single unit.
#[derive(Clone)]
pub struct Queue {
    pool: PgPool,
    channel: String,
}

impl Queue {
    pub async fn new(config: &PoolConfig, channel: &str) -> Result<Self, QueueError> {
        let pool = config
            .connect()
            .await
            .map_err(|error| QueueError::PoolCreationError { error })?;

        Ok(Self::from_pool(pool, channel))
    }

    /// Mostly for tests, where the caller already holds a pool.
    pub fn from_pool(pool: PgPool, channel: &str) -> Self {
        Self {
            pool,
            channel: channel.to_owned(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Atomically create a job with its arguments and wake up any listening
    /// runners. Returns the new job's id.
    pub async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| QueueError::ConnectionError { error })?;

        let job_id = ops::enqueue::create_job(&mut tx, &job, &self.channel).await?;

        tx.commit()
            .await
            .map_err(|error| QueueError::TransactionError {
                command: "COMMIT".to_owned(),
                error,
            })?;

        metrics::counter!(JOBS_ENQUEUED).increment(1);

        Ok(job_id)
    }

    /// Suppress dispatch of a pending job. Attempts already running are not
    /// interrupted.
    pub async fn cancel(&self, job_id: JobId) -> Result<bool, QueueError> {
        ops::results::cancel_job(&self.pool, job_id).await
    }

    /// The stored value of a finished job.
    ///
    /// Signals `Unfinished` while the job has no final result, and
    /// `PermanentFailure` (carrying the last exception text) once retries
    /// are exhausted or the handler could not be resolved.
    pub async fn get_result(&self, job_id: JobId) -> Result<Value, ResultError> {
        match ops::results::get_final_result(&self.pool, job_id).await? {
            None => Err(ResultError::Unfinished(job_id)),
            Some(row) if row.success => Ok(row.result.unwrap_or(Value::Null)),
            Some(row) => Err(ResultError::PermanentFailure {
                job: job_id,
                exception: row.exception,
            }),
        }
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, QueueError> {
        ops::claim::get_job(&self.pool, job_id).await
    }

    pub async fn attempt_count(&self, job_id: JobId) -> Result<i64, QueueError> {
        ops::results::count_results(&self.pool, job_id).await
    }

    pub async fn results_for(&self, job_id: JobId) -> Result<Vec<JobResult>, QueueError> {
        ops::results::results_for(&self.pool, job_id).await
    }
}

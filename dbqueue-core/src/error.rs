use thiserror::Error;

use crate::types::JobId;

/// Enumeration of database-related errors in the queue.
/// Errors that can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("pool creation failed with: {error}")]
    PoolCreationError { error: sqlx::Error },
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("transaction {command} failed with: {error}")]
    TransactionError { command: String, error: sqlx::Error },
}

impl QueueError {
    pub(crate) fn query(command: &str) -> impl FnOnce(sqlx::Error) -> QueueError {
        let command = command.to_owned();
        move |error| QueueError::QueryError { command, error }
    }
}

/// What `get_result` reports for a job that cannot hand back a value.
#[derive(Error, Debug)]
pub enum ResultError {
    #[error("job {0} has not finished")]
    Unfinished(JobId),
    #[error("job {job} failed permanently: {exception}")]
    PermanentFailure { job: JobId, exception: String },
    #[error(transparent)]
    Database(#[from] QueueError),
}

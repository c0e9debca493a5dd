use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("invalid configuration: {0}")]
    ConfigurationError(String),
    #[error(transparent)]
    QueueError(#[from] dbqueue_core::QueueError),
    #[error("notification listener failed with: {0}")]
    ListenerError(sqlx::Error),
    #[error("{0} panicked")]
    ComponentPanicked(String),
}

//! # dbqueue-core
//!
//! A durable task queue backed by PostgreSQL tables.
//!
//! Producers enqueue a handler name plus positional and keyword arguments;
//! runners claim eligible jobs under `FOR UPDATE SKIP LOCKED`, dispatch
//! them through a process-wide handler registry, and append one result row
//! per attempt, scheduling bounded exponential retries on failure.

mod ops;

// We do this pattern (privately use a module, then re-export parts of it) so we
// can refactor the internals without breaking the public API.

// Types
mod types;
pub use types::EnqueueOptions;
pub use types::Job;
pub use types::JobId;
pub use types::JobResult;
pub use types::NewJob;

// Errors
mod error;
pub use error::QueueError;
pub use error::ResultError;

// Store façade
mod queue;
pub use queue::PoolConfig;
pub use queue::Queue;

// Handler registry
mod registry;
pub use registry::Handler;
pub use registry::HandlerError;
pub use registry::HandlerRegistry;
pub use registry::Kwargs;
pub use registry::UnresolvedHandler;

// Executor
mod executor;
pub use executor::execute_job;
pub use executor::AttemptOutcome;

// Retry
mod retry;
pub use retry::RetryPolicy;

// Observability
pub mod metrics;
pub mod metrics_consts;

// Claim-side operations, exposed directly because the runner wraps a claim
// and its result writes in one transaction it owns.
pub use ops::claim::claim_one;

/// The default pub/sub channel the store announces new work on.
pub const DEFAULT_CHANNEL: &str = "dbqueue_notifications";

pub const JOBS_ENQUEUED: &str = "dbqueue_jobs_enqueued";
pub const JOBS_COMPLETED: &str = "dbqueue_jobs_completed";
pub const JOBS_RETRIED: &str = "dbqueue_jobs_retried";
pub const JOBS_EXHAUSTED: &str = "dbqueue_jobs_exhausted";
pub const JOBS_UNRESOLVED: &str = "dbqueue_jobs_unresolved";
pub const WORKER_DRAIN_PASSES: &str = "dbqueue_worker_drain_passes";
pub const NOTIFICATIONS_RECEIVED: &str = "dbqueue_notifications_received";

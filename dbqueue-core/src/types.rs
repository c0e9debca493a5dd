use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Jobs are keyed by a plain bigserial, assigned by the store on enqueue.
pub type JobId = i64;

/// A persisted unit of work, as claimed from the store.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Job {
    /// A unique id identifying a job.
    pub id: JobId,
    /// The registered name of the handler this job will be dispatched to.
    pub func_name: String,
    /// A datetime corresponding to when the job was enqueued.
    pub queued_at: DateTime<Utc>,
    /// For sorting eligible jobs. Lower is higher priority.
    pub priority: i16,
    /// If set, the job is not eligible before this instant.
    pub delay_until: Option<DateTime<Utc>>,
    /// If set, the job is not eligible before this instant. Written by the
    /// retry schedule after a failed attempt.
    pub error_delay_until: Option<DateTime<Utc>>,
    /// How many retries are allowed after the first attempt. Zero means
    /// exactly one attempt.
    pub max_retries: i16,
    /// The base interval for the retry back-off, in milliseconds.
    pub retry_delay_ms: i64,
    /// The result row that terminated this job, if any. A job with a final
    /// result is never dispatched again.
    pub final_result_id: Option<i64>,
    /// Canceled jobs are never dispatched.
    pub canceled: bool,
}

impl Job {
    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_delay_ms.max(0) as u64)
    }
}

/// The recorded outcome of one attempt at a job.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct JobResult {
    pub id: i64,
    pub job_id: JobId,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Display form of the failure. Empty on success.
    pub exception: String,
    /// Diagnostic rendering of the failure. Empty on success or when
    /// nothing more than the message is available.
    pub traceback: String,
    /// The handler's return value. Present on success only.
    pub result: Option<Value>,
}

/// Scheduling knobs accepted at enqueue time.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueOptions {
    pub priority: i16,
    pub delay_until: Option<DateTime<Utc>>,
    pub max_retries: i16,
    pub retry_delay: std::time::Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 1000,
            delay_until: None,
            max_retries: 0,
            retry_delay: std::time::Duration::from_secs(1),
        }
    }
}

/// The chunk of data needed to enqueue a job.
///
/// Keyword arguments are kept as an ordered list rather than a map: the
/// store does not enforce uniqueness on parameter names, and readers take
/// the last observed value, so insertion order is meaningful.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub func_name: String,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
    pub options: EnqueueOptions,
}

impl NewJob {
    pub fn new(func_name: &str) -> Self {
        Self {
            func_name: func_name.to_owned(),
            args: Vec::new(),
            kwargs: Vec::new(),
            options: EnqueueOptions::default(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.kwargs.push((name.to_owned(), value.into()));
        self
    }

    pub fn priority(mut self, priority: i16) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn delay_until(mut self, instant: DateTime<Utc>) -> Self {
        self.options.delay_until = Some(instant);
        self
    }

    pub fn max_retries(mut self, max_retries: i16) -> Self {
        self.options.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.options.retry_delay = delay;
        self
    }

    pub(crate) fn retry_delay_ms(&self) -> i64 {
        i64::try_from(self.options.retry_delay.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Roundtripping a datetime through the store truncates to microseconds, so
/// scheduling arithmetic sticks to millisecond precision.
pub(crate) fn to_chrono_duration(duration: std::time::Duration) -> Duration {
    Duration::milliseconds(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
}

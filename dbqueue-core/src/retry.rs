use std::time;

/// The policy used to schedule `error_delay_until` when an attempt fails
/// with retries remaining.
///
/// The base interval is carried by each job (`retry_delay`); the policy
/// contributes the growth coefficient and the ceiling, which are operator
/// configuration rather than per-job data.
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    /// Coefficient to multiply the job's retry delay with for every past attempt.
    backoff_coefficient: u32,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<time::Duration>,
}

impl RetryPolicy {
    pub fn new(backoff_coefficient: u32, maximum_interval: Option<time::Duration>) -> Self {
        Self {
            backoff_coefficient,
            maximum_interval,
        }
    }

    /// Calculate the time until the next retry after `attempt` failed
    /// attempts. The first retry waits exactly `retry_delay`.
    pub fn time_until_next_retry(
        &self,
        retry_delay: time::Duration,
        attempt: u32,
    ) -> time::Duration {
        let candidate_interval =
            retry_delay * self.backoff_coefficient.pow(attempt.saturating_sub(1));

        if let Some(max_interval) = self.maximum_interval {
            std::cmp::min(candidate_interval, max_interval)
        } else {
            candidate_interval
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            maximum_interval: Some(time::Duration::from_secs(100)),
        }
    }
}

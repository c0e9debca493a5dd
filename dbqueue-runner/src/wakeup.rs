use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::run_event::RunEvent;

/// Sets the run-event every `period` as a liveness floor.
///
/// Notifications are advisory and may be dropped; this tick is the upper
/// bound on how long an eligible job can sit unclaimed, and the only wake
/// source for future-dated and retried jobs.
pub struct Wakeup {
    period: Duration,
    run_event: Arc<RunEvent>,
    shutdown: CancellationToken,
}

impl Wakeup {
    pub fn new(period: Duration, run_event: Arc<RunEvent>, shutdown: CancellationToken) -> Self {
        Self {
            period,
            run_event,
            shutdown,
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the supervisor already
        // starts with the run-event set, so skip it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    debug!("periodic rescan tick");
                    self.run_event.set();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wakeup_sets_event_every_period() {
        let run_event = Arc::new(RunEvent::new());
        let shutdown = CancellationToken::new();

        let wakeup = Wakeup::new(
            Duration::from_secs(60),
            run_event.clone(),
            shutdown.clone(),
        );
        let handle = tokio::spawn(wakeup.run());

        // Nothing before the first period elapses.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!run_event.is_set());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(run_event.is_set());

        // Cleared by a consumer, set again on the next tick.
        run_event.clear();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(run_event.is_set());

        shutdown.cancel();
        handle.await.expect("wakeup task failed");
    }
}

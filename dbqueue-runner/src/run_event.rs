use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A level-triggered, manually-reset signal shared by every runner.
///
/// Setters never block and wake every current waiter; the flag stays up
/// until some consumer clears it. A clear racing with a set is harmless:
/// the store is consulted authoritatively on every wake-up, so a spurious
/// wake costs one empty claim query and a missed wake cannot lose work
/// (whoever set the event after the clear wakes the waiters again).
#[derive(Default)]
pub struct RunEvent {
    set: AtomicBool,
    notify: Notify,
}

impl RunEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.set.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// Wait until the event is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking the flag, so a set() landing
            // between the check and the await still wakes us.
            let notified = self.notify.notified();

            if self.is_set() {
                return;
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_set() {
        let event = RunEvent::new();
        event.set();

        tokio::time::timeout(Duration::from_secs(1), event.wait())
            .await
            .expect("wait did not return on a set event");
    }

    #[tokio::test]
    async fn test_wait_blocks_until_set() {
        let event = Arc::new(RunEvent::new());

        let waiter = {
            let event = event.clone();
            tokio::spawn(async move { event.wait().await })
        };

        // Give the waiter time to park before setting.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        event.set();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not wake on set")
            .expect("waiter task failed");
    }

    #[tokio::test]
    async fn test_clear_blocks_future_waits() {
        let event = Arc::new(RunEvent::new());
        event.set();
        event.clear();
        assert!(!event.is_set());

        let waiter = {
            let event = event.clone();
            tokio::spawn(async move { event.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        event.set();
        waiter.await.expect("waiter task failed");
    }

    #[tokio::test]
    async fn test_set_wakes_all_waiters() {
        let event = Arc::new(RunEvent::new());

        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let event = event.clone();
                tokio::spawn(async move { event.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        event.set();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter did not wake on set")
                .expect("waiter task failed");
        }
    }
}

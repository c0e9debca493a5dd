use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dbqueue_core::metrics_consts::NOTIFICATIONS_RECEIVED;

use crate::error::RunnerError;
use crate::run_event::RunEvent;

/// Upper bound on one blocking receive. Keeps shutdown latency bounded
/// even if the cancellation signal is somehow lost.
const RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Holds a dedicated connection subscribed to the wake-up channel and sets
/// the run-event whenever anything arrives on it.
///
/// Payloads are ignored on purpose: any message just means "there may be
/// work", and the level-triggered run-event coalesces bursts for free.
/// A dropped connection is quietly re-established by `recv`, with the
/// periodic rescan covering any notifications lost in the gap; only an
/// unrecoverable receive error ends the loop, and the supervisor promotes
/// that to a full shutdown, because without notifications the system's
/// promptness degrades to the rescan period alone.
pub struct NotificationListener {
    source: ConnectionSource,
    channel: String,
    run_event: Arc<RunEvent>,
    shutdown: CancellationToken,
    liveness: HealthHandle,
}

enum ConnectionSource {
    Url(String),
    Pool(sqlx::PgPool),
}

impl NotificationListener {
    pub fn new(
        database_url: &str,
        channel: &str,
        run_event: Arc<RunEvent>,
        shutdown: CancellationToken,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            source: ConnectionSource::Url(database_url.to_owned()),
            channel: channel.to_owned(),
            run_event,
            shutdown,
            liveness,
        }
    }

    /// Mostly for tests, where the caller already holds a pool.
    pub fn new_from_pool(
        pool: sqlx::PgPool,
        channel: &str,
        run_event: Arc<RunEvent>,
        shutdown: CancellationToken,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            source: ConnectionSource::Pool(pool),
            channel: channel.to_owned(),
            run_event,
            shutdown,
            liveness,
        }
    }

    async fn connect(&self) -> Result<PgListener, sqlx::Error> {
        // Either way the listener holds a dedicated connection: the
        // subscription must outlive any pool recycling, and LISTEN
        // requires autocommit.
        match &self.source {
            ConnectionSource::Url(url) => PgListener::connect(url).await,
            ConnectionSource::Pool(pool) => PgListener::connect_with(pool).await,
        }
    }

    pub async fn run(&self) -> Result<(), RunnerError> {
        let mut listener = self.connect().await.map_err(RunnerError::ListenerError)?;

        listener
            .listen(&self.channel)
            .await
            .map_err(RunnerError::ListenerError)?;

        info!(channel = %self.channel, "listening for notifications");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = tokio::time::timeout(RECV_TIMEOUT, listener.recv()) => {
                    self.liveness.report_healthy();

                    match result {
                        // Bounded wait elapsed with nothing to do; loop to
                        // re-check the shutdown flag.
                        Err(_) => debug!("notification wait timed out"),
                        Ok(Ok(_notification)) => {
                            debug!(channel = %self.channel, "received notification");
                            metrics::counter!(NOTIFICATIONS_RECEIVED).increment(1);

                            if !self.shutdown.is_cancelled() {
                                self.run_event.set();
                            }
                        }
                        // The dedicated connection is gone for good. Bail
                        // out and let the supervisor take the process down.
                        Ok(Err(error)) => return Err(RunnerError::ListenerError(error)),
                    }
                }
            }
        }

        info!("notification listener finished");
        Ok(())
    }
}

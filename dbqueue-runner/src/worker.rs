use std::sync::Arc;

use health::HealthHandle;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dbqueue_core::metrics_consts::WORKER_DRAIN_PASSES;
use dbqueue_core::{claim_one, execute_job, HandlerRegistry, QueueError, RetryPolicy};

use crate::error::RunnerError;
use crate::run_event::RunEvent;

/// A runner that drains the queue whenever the shared run-event fires.
///
/// The loop has three phases. Idle: parked on the run-event (or the
/// shutdown token). Draining: claim one job per short transaction and
/// execute it, until a claim comes back empty. Cooling: clear the run-event
/// so the other runners also go back to sleep once they drain, flag the
/// idle event, and park again. Store errors during a drain are treated as
/// "no job": the attempt's transaction dies with its row lock and the
/// runner goes back to idle rather than hot-looping on a broken store.
pub struct JobRunner {
    name: String,
    pool: PgPool,
    registry: Arc<HandlerRegistry>,
    retry_policy: RetryPolicy,
    run_event: Arc<RunEvent>,
    idle: Arc<RunEvent>,
    shutdown: CancellationToken,
    liveness: HealthHandle,
}

impl JobRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        pool: PgPool,
        registry: Arc<HandlerRegistry>,
        retry_policy: RetryPolicy,
        run_event: Arc<RunEvent>,
        shutdown: CancellationToken,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            name: name.to_owned(),
            pool,
            registry,
            retry_policy,
            run_event,
            idle: Arc::new(RunEvent::new()),
            shutdown,
            liveness,
        }
    }

    /// The idle indicator: set whenever this runner has drained its view of
    /// the queue and gone back to waiting. Mainly for synchronization in
    /// tests.
    pub fn idle(&self) -> Arc<RunEvent> {
        self.idle.clone()
    }

    pub async fn run(&self) -> Result<(), RunnerError> {
        info!(runner = %self.name, "job runner started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.run_event.wait() => {}
            }
            debug!(runner = %self.name, "got run event");

            self.idle.clear();

            while !self.shutdown.is_cancelled() {
                self.liveness.report_healthy();

                match self.run_one().await {
                    Ok(true) => continue,
                    Ok(false) => {
                        debug!(runner = %self.name, "queue drained");
                        break;
                    }
                    Err(error) => {
                        warn!(runner = %self.name, "store unavailable, abandoning drain: {error}");
                        break;
                    }
                }
            }

            if !self.shutdown.is_cancelled() {
                // Out of jobs: clear the event so everyone stops. Another
                // runner may set it again right away; the store stays
                // authoritative either way.
                self.run_event.clear();
            }

            metrics::counter!(WORKER_DRAIN_PASSES).increment(1);
            self.idle.set();
        }

        info!(runner = %self.name, "job runner exiting");
        Ok(())
    }

    /// Claim and execute at most one job inside a single transaction.
    /// Returns false when no eligible job was found.
    async fn run_one(&self) -> Result<bool, QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| QueueError::ConnectionError { error })?;

        let Some(job) = claim_one(&mut *tx).await? else {
            // Dropping the transaction rolls it back and returns the
            // connection to the pool before we go idle.
            return Ok(false);
        };

        debug!(runner = %self.name, job_id = job.id, "executing job");
        execute_job(&mut tx, &job, &self.registry, &self.retry_policy).await?;

        tx.commit()
            .await
            .map_err(|error| QueueError::TransactionError {
                command: "COMMIT".to_owned(),
                error,
            })?;

        Ok(true)
    }
}

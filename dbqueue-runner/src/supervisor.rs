use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use health::HealthRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dbqueue_core::metrics::{serve, setup_metrics_routes};
use dbqueue_core::{HandlerRegistry, PoolConfig, QueueError};

use crate::config::{supports_notifications, Config};
use crate::error::RunnerError;
use crate::listener::NotificationListener;
use crate::run_event::RunEvent;
use crate::signals;
use crate::wakeup::Wakeup;
use crate::worker::JobRunner;

/// Compose the whole runner process: N job runners, the notification
/// listener, the periodic waker, the signal trap, and the liveness/metrics
/// endpoint; then block until something triggers an exit and unwind in
/// order.
///
/// Any joined component ending, cleanly or not, cancels the shared shutdown
/// token and takes the process with it: a queue runner without its listener
/// or runners is degraded below its contract, and restarting beats limping.
pub async fn run_queue(
    config: &Config,
    rescan_period: u64,
    job_runners: usize,
    registry: Arc<HandlerRegistry>,
) -> Result<(), RunnerError> {
    if job_runners < 1 {
        return Err(RunnerError::ConfigurationError(
            "must have at least one job runner".to_owned(),
        ));
    }

    let database_url = config.database_url()?;
    let execute_async = supports_notifications(&database_url);

    if !execute_async && rescan_period == 0 {
        return Err(RunnerError::ConfigurationError(
            "either async notifications or a rescan period must be enabled".to_owned(),
        ));
    }

    if execute_async {
        info!("async notifications will be enabled");
    } else {
        info!("async notifications are not available for this store");
    }

    if rescan_period > 0 {
        info!(seconds = rescan_period, "periodic rescan enabled");
    } else {
        warn!("periodic rescan is not enabled");
    }

    let mut pool_config = PoolConfig::new(&database_url);
    pool_config.max_connections = Some(config.max_pg_connections);
    let pool = pool_config
        .connect()
        .await
        .map_err(|error| QueueError::PoolCreationError { error })?;

    let retry_policy = config.retry_policy();

    let run_event = Arc::new(RunEvent::new());
    // Set at start-up, so the runners make one pass immediately and sweep
    // any work enqueued while no process was running.
    run_event.set();

    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            signals::wait_for_shutdown_signal().await;
            shutdown.cancel();
        });
    }

    let liveness = HealthRegistry::new("liveness");

    // Runners report once per drain pass, so their deadline has to span at
    // least one rescan period of silence. Without a rescan the only wake
    // source is traffic, and stretches of quiet are normal.
    let runner_deadline = if rescan_period > 0 {
        time::Duration::seconds((rescan_period * 2).max(120) as i64)
    } else {
        time::Duration::days(1)
    };

    let mut wait_on: Vec<(String, JoinHandle<Result<(), RunnerError>>)> = Vec::new();

    if execute_async {
        let name = "notification-listener";
        let handle = liveness.register(name.to_string(), time::Duration::seconds(60));
        let listener = NotificationListener::new(
            &database_url,
            &config.channel_name,
            run_event.clone(),
            shutdown.clone(),
            handle,
        );
        wait_on.push((
            name.to_owned(),
            spawn_watched(name, shutdown.clone(), async move {
                listener.run().await
            }),
        ));
    }

    if rescan_period > 0 {
        let wakeup = Wakeup::new(
            std::time::Duration::from_secs(rescan_period),
            run_event.clone(),
            shutdown.clone(),
        );
        // Daemon semantics: dies with the process, never joined.
        tokio::spawn(wakeup.run());
    }

    for i in 0..job_runners {
        let name = format!("job-runner-{i}");
        let handle = liveness.register(name.clone(), runner_deadline);
        let runner = JobRunner::new(
            &name,
            pool.clone(),
            registry.clone(),
            retry_policy,
            run_event.clone(),
            shutdown.clone(),
            handle,
        );
        wait_on.push((
            name.clone(),
            spawn_watched(&name, shutdown.clone(), async move { runner.run().await }),
        ));
    }

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", {
            let liveness = liveness.clone();
            get(move || std::future::ready(liveness.get_status()))
        });
    let router = setup_metrics_routes(router);
    let bind = config.bind();
    tokio::spawn(async move {
        if let Err(error) = serve(router, &bind).await {
            error!("failed to start serving metrics: {error}");
        }
    });

    info!("waiting for exit event");
    shutdown.cancelled().await;
    info!("beginning exit routine");

    // Unblock any runner parked on the run-event so it can observe the
    // shutdown flag. In-flight jobs are allowed to finish.
    run_event.set();

    let mut first_error: Option<RunnerError> = None;
    for (name, handle) in wait_on {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                first_error.get_or_insert(error);
            }
            Err(join_error) => {
                error!(component = %name, "component panicked: {join_error}");
                first_error.get_or_insert(RunnerError::ComponentPanicked(name));
            }
        }
    }

    info!("exiting run queue");
    first_error.map_or(Ok(()), Err)
}

/// Spawn a component whose termination, for any reason, begins the exit
/// routine. The handle still yields the component's own result for
/// reporting at join time.
fn spawn_watched<F>(
    name: &str,
    shutdown: CancellationToken,
    fut: F,
) -> JoinHandle<Result<(), RunnerError>>
where
    F: Future<Output = Result<(), RunnerError>> + Send + 'static,
{
    let name = name.to_owned();
    tokio::spawn(async move {
        let result = fut.await;
        match &result {
            Ok(()) => info!(component = %name, "component finished"),
            Err(error) => error!(component = %name, "component failed: {error}"),
        }
        shutdown.cancel();
        result
    })
}

pub async fn index() -> &'static str {
    "dbqueue runner"
}

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Serve `router` on `bind` until the process exits.
///
/// The runner parks this on a background task beside its loops; the
/// endpoint only carries probes and scrapes, so it gets no graceful
/// shutdown path of its own.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}

/// Mount the Prometheus rendering endpoint onto an existing `Router`,
/// installing the recorder as a side effect. Call once per process.
pub fn setup_metrics_routes(router: Router) -> Router {
    let recorder_handle = setup_metrics_recorder();

    router.route(
        "/metrics",
        get(move || std::future::ready(recorder_handle.render())),
    )
}

/// Install the global Prometheus recorder.
///
/// The histogram grid is sized for job execution times, not request
/// latencies: a claim plus its result writes lands in the low
/// milliseconds, while a handler is allowed to run for minutes, so the
/// buckets stretch from 5ms out to ten minutes.
pub fn setup_metrics_recorder() -> PrometheusHandle {
    const JOB_DURATION_SECONDS: &[f64] = &[
        0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 600.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(JOB_DURATION_SECONDS)
        .unwrap()
        .install_recorder()
        .unwrap()
}

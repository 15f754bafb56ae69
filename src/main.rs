use app_screenshots::{
    app_state::AppState,
    auth::TokenVerifier,
    bootstrap::{self, Backends},
    config::AppConfig,
    routes,
    services::{
        queue::{JobDispatcher, JobQueue},
        worker_pool::WorkerPool,
    },
};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing app-screenshots server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    let backends = bootstrap::connect_backends(&config)
        .await
        .expect("Failed to initialize storage backends");

    // Anything still `processing` belongs to a process that is gone.
    bootstrap::sweep_stalled(backends.jobs.as_ref(), config.stall_after())
        .await
        .expect("Failed to sweep stalled jobs");

    let dispatcher = build_dispatcher(&config, &backends);

    let state = AppState::new(
        backends.jobs.clone(),
        backends.users.clone(),
        backends.artifacts.clone(),
        dispatcher,
        TokenVerifier::new(&config.jwt_secret),
    );

    let app = routes::router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    tracing::info!("Starting app-screenshots on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}

/// Redis when configured (processed by the `worker` binary), otherwise an
/// in-process pool.
fn build_dispatcher(config: &AppConfig, backends: &Backends) -> Arc<dyn JobDispatcher> {
    match config.redis_url() {
        Some(url) => {
            tracing::info!("Dispatching jobs to Redis queue");
            Arc::new(JobQueue::new(url).expect("Failed to initialize job queue"))
        }
        None => {
            tracing::info!("REDIS_URL not set, processing jobs in-process");
            let processor = bootstrap::build_processor(config, backends);
            Arc::new(WorkerPool::spawn(
                processor,
                config.worker_concurrency,
                config.queue_capacity,
            ))
        }
    }
}

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus metrics scrape endpoint, text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "screenshot_jobs_submitted",
        "Total screenshot jobs accepted"
    );
    metrics::describe_counter!(
        "screenshot_jobs_completed",
        "Total screenshot jobs completed"
    );
    metrics::describe_counter!(
        "screenshot_jobs_failed",
        "Total screenshot jobs that failed"
    );
    metrics::describe_counter!(
        "quota_denials_total",
        "Submissions rejected by the quota gate"
    );
    metrics::describe_histogram!(
        "screenshot_processing_seconds",
        "Time from claim to completed archive"
    );
    metrics::describe_gauge!(
        "screenshot_queue_depth",
        "Jobs waiting in the Redis queue"
    );
}

use app_screenshots::{
    bootstrap,
    config::AppConfig,
    db::{JobStore, STALLED_REASON},
    models::job::JobStatus,
    routes,
    services::{
        processor::{JobProcessor, ProcessOutcome},
        queue::JobQueue,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting screenshot worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let redis_url = config
        .redis_url()
        .expect("REDIS_URL is required for the worker");

    // The worker has no HTTP router; the exporter serves its own listener.
    let metrics_addr = config
        .worker_metrics_addr()
        .expect("WORKER_METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics exporter");
    routes::metrics::describe_metrics();
    tracing::info!(addr = %metrics_addr, "Serving worker metrics");

    let backends = bootstrap::connect_backends(&config)
        .await
        .expect("Failed to initialize storage backends");
    let queue = JobQueue::new(redis_url).expect("Failed to initialize job queue");
    let processor = bootstrap::build_processor(&config, &backends);

    recover_orphans(&queue, backends.jobs.as_ref())
        .await
        .expect("Failed to recover orphaned jobs");

    tracing::info!("Worker ready, starting job processing loop");

    loop {
        match process_next_job(&queue, &processor).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Jobs in the processing list were claimed by a worker that died.
///
/// Acquisition is not resumable, so any that are still `processing` fail
/// with the stalled reason; pending ones are put back on the queue.
async fn recover_orphans(queue: &JobQueue, jobs: &dyn JobStore) -> Result<(), Box<dyn std::error::Error>> {
    let orphans = queue.take_orphans().await?;
    if orphans.is_empty() {
        return Ok(());
    }

    tracing::warn!(count = orphans.len(), "Recovering orphaned queue entries");
    for orphan in orphans {
        match jobs.get(orphan.job_id).await?.map(|j| j.status) {
            Some(JobStatus::Processing) => {
                jobs.mark_failed(orphan.job_id, STALLED_REASON).await?;
                tracing::warn!(job_id = %orphan.job_id, "Orphaned job marked failed");
            }
            Some(JobStatus::Pending) => {
                queue.enqueue(&orphan).await?;
                tracing::info!(job_id = %orphan.job_id, "Orphaned job re-queued");
            }
            _ => {}
        }
    }
    Ok(())
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was handled, Ok(false) if the queue was empty.
async fn process_next_job(
    queue: &JobQueue,
    processor: &JobProcessor,
) -> Result<bool, Box<dyn std::error::Error>> {
    if let Ok(depth) = queue.queue_depth().await {
        metrics::gauge!("screenshot_queue_depth").set(depth as f64);
    }

    let job = match queue.dequeue().await? {
        Some(j) => j,
        None => return Ok(false),
    };

    tracing::info!(job_id = %job.job_id, "Dequeued screenshot job");

    match processor.process(job.job_id).await {
        Ok(ProcessOutcome::Completed { .. }) | Ok(ProcessOutcome::Failed { .. }) => {}
        Ok(ProcessOutcome::Skipped { status }) => {
            tracing::debug!(job_id = %job.job_id, status = ?status, "Queue entry was stale");
        }
        Err(e) => {
            // Leave the entry in the processing list for orphan recovery.
            tracing::error!(job_id = %job.job_id, error = %e, "Failed to record job outcome");
            return Err(e.into());
        }
    }

    queue.complete(&job).await?;
    Ok(true)
}

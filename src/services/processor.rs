use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{JobStore, StoreError};
use crate::models::job::{JobStatus, ScreenshotJob};
use crate::services::packager::{PackageError, Workspace};
use crate::services::source::{Screenshot, ScreenshotSource, SourceError};
use crate::services::storage::{ArtifactStore, StorageError};

/// Longest reason string persisted on a failed job.
const MAX_REASON_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Root for per-job workspaces.
    pub work_dir: PathBuf,
    /// Bound on one acquisition attempt.
    pub acquisition_timeout: Duration,
    /// Total acquisition attempts, including the first.
    pub max_acquisition_attempts: u32,
    /// Keep the per-job workspace after packaging.
    pub retain_workspaces: bool,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./data/work"),
            acquisition_timeout: Duration::from_secs(60),
            max_acquisition_attempts: 2,
            retain_workspaces: true,
        }
    }
}

/// What a single `process` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed { artifact: String },
    Failed { reason: String },
    /// Job was missing or not `pending`; nothing was touched.
    Skipped { status: Option<JobStatus> },
}

/// Failure during acquisition or packaging. Recorded on the job, never
/// returned to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("timeout")]
    Timeout,

    #[error("no screenshots found")]
    NoScreenshots,

    #[error("screenshot source failed: {0}")]
    Source(#[from] SourceError),

    #[error("packaging failed: {0}")]
    Package(#[from] PackageError),

    #[error("archive storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl ProcessError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessError::Timeout | ProcessError::Source(SourceError::Upstream(_))
        )
    }
}

fn summarize(err: &ProcessError) -> String {
    err.to_string().chars().take(MAX_REASON_LEN).collect()
}

/// Drives one job through `pending -> processing -> completed | failed`.
///
/// The processor is the only writer of a job after creation. Claiming goes
/// through `JobStore::mark_processing`, so invoking it again on a job that is
/// already processing or terminal is a no-op.
pub struct JobProcessor {
    jobs: Arc<dyn JobStore>,
    source: Arc<dyn ScreenshotSource>,
    artifacts: Arc<dyn ArtifactStore>,
    settings: ProcessorSettings,
}

impl JobProcessor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        source: Arc<dyn ScreenshotSource>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            jobs,
            source,
            artifacts,
            settings,
        }
    }

    pub async fn process(&self, job_id: Uuid) -> Result<ProcessOutcome, StoreError> {
        // Persist `processing` before any external work.
        let Some(job) = self.jobs.mark_processing(job_id).await? else {
            let status = self.jobs.get(job_id).await?.map(|j| j.status);
            debug!(job_id = %job_id, status = ?status, "Job not pending, skipping");
            return Ok(ProcessOutcome::Skipped { status });
        };

        info!(
            job_id = %job.id,
            store = %job.store,
            app_id = %job.app_id,
            "Processing screenshot job"
        );
        let start = Instant::now();

        match self.run(&job).await {
            Ok(artifact) => {
                if !self.jobs.mark_completed(job.id, &artifact).await? {
                    let status = self.jobs.get(job.id).await?.map(|j| j.status);
                    warn!(job_id = %job.id, status = ?status, "Job changed state during processing");
                    return Ok(ProcessOutcome::Skipped { status });
                }

                metrics::counter!("screenshot_jobs_completed").increment(1);
                metrics::histogram!("screenshot_processing_seconds")
                    .record(start.elapsed().as_secs_f64());
                info!(
                    job_id = %job.id,
                    artifact = %artifact,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed"
                );
                Ok(ProcessOutcome::Completed { artifact })
            }
            Err(e) => {
                let reason = summarize(&e);
                error!(job_id = %job.id, error = %e, "Job processing failed");
                self.jobs.mark_failed(job.id, &reason).await?;
                metrics::counter!("screenshot_jobs_failed").increment(1);
                Ok(ProcessOutcome::Failed { reason })
            }
        }
    }

    /// Acquire, materialize, package, store. Strictly sequential.
    async fn run(&self, job: &ScreenshotJob) -> Result<String, ProcessError> {
        let shots = self.acquire(job).await?;
        if shots.is_empty() {
            return Err(ProcessError::NoScreenshots);
        }

        let workspace = Workspace::for_job(&self.settings.work_dir, job.id);
        let files = workspace.materialize(&shots).await?;
        debug!(job_id = %job.id, files = files.len(), dir = %workspace.path().display(), "Screenshots written");

        let archive = workspace.package().await?;
        let artifact = self.artifacts.put_archive(job.id, archive).await?;

        if !self.settings.retain_workspaces {
            if let Err(e) = workspace.remove().await {
                warn!(job_id = %job.id, error = %e, "Failed to remove workspace");
            }
        }

        Ok(artifact)
    }

    async fn acquire(&self, job: &ScreenshotJob) -> Result<Vec<Screenshot>, ProcessError> {
        let attempts = self.settings.max_acquisition_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = tokio::time::timeout(
                self.settings.acquisition_timeout,
                self.source.fetch(job.store, &job.app_id),
            )
            .await;

            let err = match result {
                Ok(Ok(shots)) => return Ok(shots),
                Ok(Err(e)) => ProcessError::Source(e),
                Err(_) => ProcessError::Timeout,
            };

            if attempt >= attempts || !err.is_retryable() {
                return Err(err);
            }

            warn!(
                job_id = %job.id,
                attempt = attempt,
                error = %err,
                "Screenshot acquisition failed, retrying"
            );
            attempt += 1;
        }
    }
}

use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::db::{JobStore, StoreError};
use crate::models::job::JobStatus;
use crate::services::storage::{ArtifactStore, StorageError};

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// A finished archive ready to hand to the requester.
#[derive(Debug)]
pub struct ArchiveDownload {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Missing job or someone else's job; the two are indistinguishable.
    #[error("job not found")]
    NotFound,

    #[error("job is {0}, not completed")]
    NotReady(JobStatus),

    #[error("archive for job {0} is missing")]
    ArtifactMissing(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct ArtifactDelivery {
    jobs: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ArtifactDelivery {
    pub fn new(jobs: Arc<dyn JobStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { jobs, artifacts }
    }

    /// Ownership, then status, then existence of the backing object.
    pub async fn download(&self, job_id: Uuid, user_id: &str) -> Result<ArchiveDownload, DeliveryError> {
        let job = self
            .jobs
            .get_owned(job_id, user_id)
            .await?
            .ok_or(DeliveryError::NotFound)?;

        if job.status != JobStatus::Completed {
            return Err(DeliveryError::NotReady(job.status));
        }

        let Some(locator) = job.result_artifact.as_deref() else {
            error!(job_id = %job.id, "Completed job has no artifact locator");
            return Err(DeliveryError::ArtifactMissing(job.id));
        };

        let bytes = match self.artifacts.open(locator).await? {
            Some(bytes) => bytes,
            None => {
                error!(job_id = %job.id, locator = %locator, "Archive missing for completed job");
                return Err(DeliveryError::ArtifactMissing(job.id));
            }
        };

        Ok(ArchiveDownload {
            file_name: format!("{}-screenshots.zip", job.app_id),
            content_type: ARCHIVE_CONTENT_TYPE,
            bytes,
        })
    }
}

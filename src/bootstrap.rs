//! Startup wiring shared by the API server and the worker.

use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::{
    self,
    memory::{MemoryJobStore, MemoryUserDirectory},
    queries::PgJobStore,
    user_queries::PgUserDirectory,
    JobStore, StoreError, UserDirectory,
};
use crate::models::subscription::Plan;
use crate::services::{
    encryption::{ArchiveCipher, CipherError},
    processor::JobProcessor,
    source::PlaceholderSource,
    storage::{ArtifactStore, LocalArtifactStore, R2ArtifactStore, StorageError},
};

/// Persistence backends selected from configuration.
pub struct Backends {
    pub jobs: Arc<dyn JobStore>,
    pub users: Arc<dyn UserDirectory>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

pub async fn connect_backends(config: &AppConfig) -> Result<Backends, BootstrapError> {
    let (jobs, users): (Arc<dyn JobStore>, Arc<dyn UserDirectory>) = match config.database_url() {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(url).await?;
            tracing::info!("Running database migrations");
            db::run_migrations(&pool).await?;
            let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
            let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool));
            (jobs, users)
        }
        None => {
            let plan = Plan::from_str(&config.dev_plan)
                .map_err(|_| BootstrapError::Config(format!("unknown DEV_PLAN '{}'", config.dev_plan)))?;
            tracing::warn!(plan = %plan, "DATABASE_URL not set, using in-memory stores");
            let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            let users: Arc<dyn UserDirectory> =
                Arc::new(MemoryUserDirectory::with_auto_provision(plan));
            (jobs, users)
        }
    };

    let artifacts: Arc<dyn ArtifactStore> = match config.r2_settings() {
        Some(r2) => {
            tracing::info!(bucket = r2.bucket, "Storing archives in R2");
            let cipher = ArchiveCipher::from_base64_key(r2.encryption_key)?;
            Arc::new(R2ArtifactStore::new(
                r2.bucket,
                r2.endpoint,
                r2.access_key,
                r2.secret_key,
                cipher,
            )?)
        }
        None => {
            tracing::info!(dir = %config.artifact_dir.display(), "Storing archives on local disk");
            Arc::new(LocalArtifactStore::new(config.artifact_dir.clone()))
        }
    };

    Ok(Backends {
        jobs,
        users,
        artifacts,
    })
}

pub fn build_processor(config: &AppConfig, backends: &Backends) -> Arc<JobProcessor> {
    Arc::new(JobProcessor::new(
        backends.jobs.clone(),
        Arc::new(PlaceholderSource::new(config.screenshots_per_app)),
        backends.artifacts.clone(),
        config.processor_settings(),
    ))
}

/// Fail jobs left in `processing` by a previous run.
pub async fn sweep_stalled(jobs: &dyn JobStore, stall_after: Duration) -> Result<u64, StoreError> {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(stall_after).unwrap_or_else(|_| chrono::Duration::zero());
    let failed = jobs.fail_stalled(cutoff).await?;
    if failed > 0 {
        tracing::warn!(count = failed, "Failed jobs stuck in processing");
    }
    Ok(failed)
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Encryption(#[from] CipherError),

    #[error("Configuration error: {0}")]
    Config(String),
}

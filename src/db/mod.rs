use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{NewJob, ScreenshotJob};
use crate::models::subscription::SubscriptionContext;

pub mod memory;
pub mod queries;
pub mod user_queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Persistent record of screenshot jobs.
///
/// Implementations enforce forward-only status transitions: every `mark_*`
/// call is conditional on the current status and reports whether it applied.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert all jobs in `pending` state, atomically.
    async fn create_jobs(&self, jobs: &[NewJob]) -> Result<Vec<ScreenshotJob>, StoreError>;

    /// Unscoped lookup, for the processor only.
    async fn get(&self, id: Uuid) -> Result<Option<ScreenshotJob>, StoreError>;

    /// Lookup scoped to the job's owner.
    async fn get_owned(&self, id: Uuid, owner_id: &str)
        -> Result<Option<ScreenshotJob>, StoreError>;

    /// All jobs of one owner, newest first.
    async fn list_owned(&self, owner_id: &str) -> Result<Vec<ScreenshotJob>, StoreError>;

    /// Claim a `pending` job. Returns `None` if the job is missing or not pending.
    async fn mark_processing(&self, id: Uuid) -> Result<Option<ScreenshotJob>, StoreError>;

    /// `processing -> completed` with the archive locator.
    async fn mark_completed(&self, id: Uuid, artifact: &str) -> Result<bool, StoreError>;

    /// `pending | processing -> failed` with a reason.
    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, StoreError>;

    /// Fail every `processing` job not touched since `older_than`.
    async fn fail_stalled(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Read access to the caller's subscription, plus usage accounting.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn subscription(&self, user_id: &str) -> Result<Option<SubscriptionContext>, StoreError>;

    /// Add `count` to the caller's period download counter.
    async fn record_downloads(&self, user_id: &str, count: u32) -> Result<(), StoreError>;
}

/// Reason recorded on jobs found stuck in `processing` at startup.
pub const STALLED_REASON: &str = "interrupted";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

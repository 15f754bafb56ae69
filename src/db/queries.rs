use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::{JobStore, StoreError, STALLED_REASON};
use crate::models::job::{AppStore, JobStatus, NewJob, ScreenshotJob};

const JOB_COLUMNS: &str = "id, app_id, app_url, store, status, result_artifact, error_reason, \
                           owner_id, created_at, updated_at";

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_job(row: &PgRow) -> Result<ScreenshotJob, StoreError> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| StoreError::Corrupt(format!("unknown job status '{status_str}'")))?;

    let store_str: String = row.try_get("store")?;
    let store = AppStore::from_str(&store_str)
        .map_err(|_| StoreError::Corrupt(format!("unknown store '{store_str}'")))?;

    Ok(ScreenshotJob {
        id: row.try_get("id")?,
        app_id: row.try_get("app_id")?,
        app_url: row.try_get("app_url")?,
        store,
        status,
        result_artifact: row.try_get("result_artifact")?,
        error_reason: row.try_get("error_reason")?,
        owner_id: row.try_get("owner_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    /// Insert jobs inside one transaction so a batch is all-or-nothing.
    async fn create_jobs(&self, jobs: &[NewJob]) -> Result<Vec<ScreenshotJob>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(jobs.len());

        for job in jobs {
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO screenshot_jobs (id, app_id, app_url, store, status, owner_id)
                VALUES ($1, $2, $3, $4, 'pending', $5)
                RETURNING {JOB_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(&job.app_id)
            .bind(&job.app_url)
            .bind(job.store.to_string())
            .bind(&job.owner_id)
            .fetch_one(&mut *tx)
            .await?;

            created.push(row_to_job(&row)?);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScreenshotJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM screenshot_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn get_owned(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<ScreenshotJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM screenshot_jobs WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn list_owned(&self, owner_id: &str) -> Result<Vec<ScreenshotJob>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM screenshot_jobs
            WHERE owner_id = $1
            ORDER BY created_at DESC, seq DESC
            "#
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn mark_processing(&self, id: Uuid) -> Result<Option<ScreenshotJob>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE screenshot_jobs
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn mark_completed(&self, id: Uuid, artifact: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE screenshot_jobs
            SET status = 'completed', result_artifact = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(artifact)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE screenshot_jobs
            SET status = 'failed', error_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_stalled(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE screenshot_jobs
            SET status = 'failed', error_reason = $2, updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            "#,
        )
        .bind(older_than)
        .bind(STALLED_REASON)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

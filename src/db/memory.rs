//! In-memory stores for development mode and tests.
//!
//! Nothing here survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{JobStore, StoreError, UserDirectory, STALLED_REASON};
use crate::models::job::{JobStatus, NewJob, ScreenshotJob};
use crate::models::subscription::{Plan, SubscriptionContext};

#[derive(Default)]
struct JobTable {
    rows: HashMap<Uuid, (u64, ScreenshotJob)>,
    next_seq: u64,
}

impl JobTable {
    /// Apply `next` to job `id` if the transition is legal.
    fn transition(
        &mut self,
        id: Uuid,
        next: JobStatus,
        artifact: Option<&str>,
        reason: Option<&str>,
    ) -> Option<ScreenshotJob> {
        let (_, job) = self.rows.get_mut(&id)?;
        if !job.status.can_transition_to(next) {
            return None;
        }
        job.status = next;
        job.result_artifact = artifact.map(str::to_string);
        job.error_reason = reason.map(str::to_string);
        job.updated_at = Utc::now();
        Some(job.clone())
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    table: RwLock<JobTable>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of job rows, across all owners.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_jobs(&self, jobs: &[NewJob]) -> Result<Vec<ScreenshotJob>, StoreError> {
        let mut table = self.table.write().await;
        let now = Utc::now();
        let mut created = Vec::with_capacity(jobs.len());

        for new in jobs {
            let job = ScreenshotJob {
                id: Uuid::new_v4(),
                app_id: new.app_id.clone(),
                app_url: new.app_url.clone(),
                store: new.store,
                status: JobStatus::Pending,
                result_artifact: None,
                error_reason: None,
                owner_id: new.owner_id.clone(),
                created_at: now,
                updated_at: now,
            };
            let seq = table.next_seq;
            table.next_seq += 1;
            table.rows.insert(job.id, (seq, job.clone()));
            created.push(job);
        }

        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScreenshotJob>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).map(|(_, j)| j.clone()))
    }

    async fn get_owned(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<ScreenshotJob>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .get(&id)
            .filter(|(_, j)| j.owner_id == owner_id)
            .map(|(_, j)| j.clone()))
    }

    async fn list_owned(&self, owner_id: &str) -> Result<Vec<ScreenshotJob>, StoreError> {
        let table = self.table.read().await;
        let mut owned: Vec<&(u64, ScreenshotJob)> = table
            .rows
            .values()
            .filter(|(_, j)| j.owner_id == owner_id)
            .collect();
        // Insertion sequence breaks ties between jobs created in the same instant.
        owned.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        Ok(owned.into_iter().map(|(_, j)| j.clone()).collect())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<Option<ScreenshotJob>, StoreError> {
        Ok(self
            .table
            .write()
            .await
            .transition(id, JobStatus::Processing, None, None))
    }

    async fn mark_completed(&self, id: Uuid, artifact: &str) -> Result<bool, StoreError> {
        Ok(self
            .table
            .write()
            .await
            .transition(id, JobStatus::Completed, Some(artifact), None)
            .is_some())
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, StoreError> {
        Ok(self
            .table
            .write()
            .await
            .transition(id, JobStatus::Failed, None, Some(reason))
            .is_some())
    }

    async fn fail_stalled(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut table = self.table.write().await;
        let stalled: Vec<Uuid> = table
            .rows
            .values()
            .filter(|(_, j)| j.status == JobStatus::Processing && j.updated_at < older_than)
            .map(|(_, j)| j.id)
            .collect();

        let mut failed = 0;
        for id in stalled {
            if table
                .transition(id, JobStatus::Failed, None, Some(STALLED_REASON))
                .is_some()
            {
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Subscription contexts held in memory.
///
/// With `auto_provision` set, unknown callers get a fresh context on that
/// plan the first time they are looked up.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, SubscriptionContext>>,
    auto_provision: Option<Plan>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_provision(plan: Plan) -> Self {
        Self {
            users: RwLock::default(),
            auto_provision: Some(plan),
        }
    }

    pub async fn upsert(&self, ctx: SubscriptionContext) {
        self.users.write().await.insert(ctx.user_id.clone(), ctx);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn subscription(&self, user_id: &str) -> Result<Option<SubscriptionContext>, StoreError> {
        if let Some(ctx) = self.users.read().await.get(user_id) {
            return Ok(Some(ctx.clone()));
        }

        let Some(plan) = self.auto_provision else {
            return Ok(None);
        };

        let mut users = self.users.write().await;
        let ctx = users
            .entry(user_id.to_string())
            .or_insert_with(|| SubscriptionContext::new(user_id, plan));
        Ok(Some(ctx.clone()))
    }

    async fn record_downloads(&self, user_id: &str, count: u32) -> Result<(), StoreError> {
        if let Some(ctx) = self.users.write().await.get_mut(user_id) {
            ctx.period_download_count = ctx.period_download_count.saturating_add(count);
        }
        Ok(())
    }
}

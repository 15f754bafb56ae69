use garde::Validate;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::{JobStore, StoreError, UserDirectory};
use crate::models::job::{AppStore, NewJob, ScreenshotJob};
use crate::models::screenshot::{BatchSubmitRequest, SubmitRequest};
use crate::models::subscription::SubscriptionContext;
use crate::services::app_id::{self, AppIdError};
use crate::services::quota::{self, Feature, QuotaDecision};
use crate::services::queue::JobDispatcher;

/// Reason stored on a job whose hand-off to the processor failed.
pub const DISPATCH_FAILED_REASON: &str = "dispatch failed";

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidAppUrl(#[from] AppIdError),

    #[error("{0}")]
    QuotaDenied(String),

    #[error("too many jobs in flight, retry shortly")]
    Busy,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Accepts screenshot requests and hands them to the processor.
///
/// Nothing is persisted until the input is validated, the app ids are
/// extracted and the quota gate has allowed the whole request.
pub struct SubmissionService {
    jobs: Arc<dyn JobStore>,
    users: Arc<dyn UserDirectory>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl SubmissionService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        users: Arc<dyn UserDirectory>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            jobs,
            users,
            dispatcher,
        }
    }

    /// Create one `pending` job. Returns before any processing happens.
    pub async fn submit(
        &self,
        user: &SubscriptionContext,
        req: &SubmitRequest,
    ) -> Result<ScreenshotJob, SubmitError> {
        req.validate()
            .map_err(|e| SubmitError::Validation(e.to_string()))?;
        let store = parse_store(&req.store)?;
        let new_job = prepare(user, &req.url, store)?;

        let mut created = self.accept(user, Feature::SingleJob, vec![new_job]).await?;
        created.pop().ok_or_else(|| {
            SubmitError::Store(StoreError::Corrupt("job insert returned no rows".to_string()))
        })
    }

    /// Create one `pending` job per URL, all or nothing.
    pub async fn submit_batch(
        &self,
        user: &SubscriptionContext,
        req: &BatchSubmitRequest,
    ) -> Result<Vec<ScreenshotJob>, SubmitError> {
        req.validate()
            .map_err(|e| SubmitError::Validation(e.to_string()))?;
        let store = parse_store(&req.store)?;
        let new_jobs = req
            .urls
            .iter()
            .map(|url| prepare(user, url, store))
            .collect::<Result<Vec<_>, _>>()?;

        self.accept(user, Feature::BatchJobs, new_jobs).await
    }

    async fn accept(
        &self,
        user: &SubscriptionContext,
        feature: Feature,
        new_jobs: Vec<NewJob>,
    ) -> Result<Vec<ScreenshotJob>, SubmitError> {
        let requested = new_jobs.len() as u32;
        if let QuotaDecision::Denied(reason) = quota::check_allowed(user, feature, requested) {
            metrics::counter!("quota_denials_total").increment(1);
            info!(user_id = %user.user_id, plan = %user.plan, reason = %reason, "Submission denied");
            return Err(SubmitError::QuotaDenied(reason));
        }

        // Refuse up front rather than create jobs nothing can pick up.
        if let Some(spare) = self.dispatcher.spare_capacity() {
            if spare < new_jobs.len() {
                warn!(user_id = %user.user_id, requested, spare, "Dispatcher saturated, rejecting submission");
                return Err(SubmitError::Busy);
            }
        }

        let mut created = self.jobs.create_jobs(&new_jobs).await?;
        // Usage is charged once the rows exist, whatever processing does later.
        // The rows are committed, so a failed charge must not stop dispatch.
        if let Err(e) = self.users.record_downloads(&user.user_id, requested).await {
            error!(user_id = %user.user_id, count = requested, error = %e, "Failed to record usage");
        }
        metrics::counter!("screenshot_jobs_submitted").increment(created.len() as u64);

        for job in &mut created {
            info!(
                job_id = %job.id,
                user_id = %user.user_id,
                store = %job.store,
                app_id = %job.app_id,
                "Screenshot job accepted"
            );

            if let Err(e) = self.dispatcher.dispatch(job.id).await {
                error!(job_id = %job.id, error = %e, "Failed to dispatch job");
                self.jobs.mark_failed(job.id, DISPATCH_FAILED_REASON).await?;
                if let Some(current) = self.jobs.get(job.id).await? {
                    *job = current;
                }
            }
        }

        Ok(created)
    }
}

fn parse_store(raw: &str) -> Result<AppStore, SubmitError> {
    AppStore::from_str(raw.trim())
        .map_err(|_| SubmitError::Validation(format!("store must be 'google' or 'apple', got '{raw}'")))
}

fn prepare(user: &SubscriptionContext, url: &str, store: AppStore) -> Result<NewJob, SubmitError> {
    let app_id = match app_id::extract_app_id(url, store) {
        Ok(id) => id,
        Err(AppIdError::InvalidUrl(msg)) => return Err(SubmitError::Validation(msg)),
        Err(e) => return Err(SubmitError::InvalidAppUrl(e)),
    };

    Ok(NewJob {
        app_id,
        app_url: url.to_string(),
        store,
        owner_id: user.user_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryJobStore, MemoryUserDirectory};
    use crate::models::job::JobStatus;
    use crate::models::subscription::Plan;
    use crate::services::queue::QueueError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    /// Records dispatched ids without running anything.
    #[derive(Default)]
    struct RecordingDispatcher {
        dispatched: Mutex<Vec<Uuid>>,
        fail: bool,
        spare: Option<usize>,
    }

    #[async_trait]
    impl JobDispatcher for RecordingDispatcher {
        async fn dispatch(&self, job_id: Uuid) -> Result<(), QueueError> {
            if self.fail {
                return Err(QueueError::Closed);
            }
            self.dispatched.lock().await.push(job_id);
            Ok(())
        }

        async fn health_check(&self) -> Result<(), QueueError> {
            Ok(())
        }

        fn spare_capacity(&self) -> Option<usize> {
            self.spare
        }
    }

    /// Knows every user but cannot write usage.
    struct ReadOnlyUsers;

    #[async_trait]
    impl UserDirectory for ReadOnlyUsers {
        async fn subscription(&self, user_id: &str) -> Result<Option<SubscriptionContext>, StoreError> {
            Ok(Some(SubscriptionContext::new(user_id, Plan::Free)))
        }

        async fn record_downloads(&self, _user_id: &str, _count: u32) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("users table is read-only".to_string()))
        }
    }

    struct Fixture {
        jobs: Arc<MemoryJobStore>,
        users: Arc<MemoryUserDirectory>,
        dispatcher: Arc<RecordingDispatcher>,
        service: SubmissionService,
    }

    fn fixture(fail_dispatch: bool) -> Fixture {
        let jobs = Arc::new(MemoryJobStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let dispatcher = Arc::new(RecordingDispatcher {
            fail: fail_dispatch,
            ..RecordingDispatcher::default()
        });
        let service = SubmissionService::new(jobs.clone(), users.clone(), dispatcher.clone());
        Fixture {
            jobs,
            users,
            dispatcher,
            service,
        }
    }

    async fn user(f: &Fixture, plan: Plan, count: u32, limit: Option<u32>) -> SubscriptionContext {
        let ctx = SubscriptionContext {
            user_id: "user-1".to_string(),
            plan,
            period_download_count: count,
            period_download_limit: limit,
        };
        f.users.upsert(ctx.clone()).await;
        ctx
    }

    fn request(url: &str, store: &str) -> SubmitRequest {
        SubmitRequest {
            url: url.to_string(),
            store: store.to_string(),
        }
    }

    #[tokio::test]
    async fn test_google_submission_is_pending_and_dispatched() {
        let f = fixture(false);
        let u = user(&f, Plan::Free, 0, Some(5)).await;

        let job = f
            .service
            .submit(
                &u,
                &request(
                    "https://play.google.com/store/apps/details?id=com.example.app",
                    "google",
                ),
            )
            .await
            .unwrap();

        assert_eq!(job.app_id, "com.example.app");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.owner_id, "user-1");
        assert_eq!(*f.dispatcher.dispatched.lock().await, vec![job.id]);

        let ctx = f.users.subscription("user-1").await.unwrap().unwrap();
        assert_eq!(ctx.period_download_count, 1);
    }

    #[tokio::test]
    async fn test_apple_submission_extracts_numeric_id() {
        let f = fixture(false);
        let u = user(&f, Plan::Free, 0, Some(5)).await;
        let job = f
            .service
            .submit(&u, &request("https://apps.apple.com/us/app/foo/id123456789", "apple"))
            .await
            .unwrap();
        assert_eq!(job.app_id, "123456789");
    }

    #[tokio::test]
    async fn test_invalid_url_creates_nothing() {
        let f = fixture(false);
        let u = user(&f, Plan::Free, 0, Some(5)).await;
        let err = f
            .service
            .submit(&u, &request("not-a-url", "google"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert!(f.jobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_store_is_validation_error() {
        let f = fixture(false);
        let u = user(&f, Plan::Free, 0, Some(5)).await;
        let err = f
            .service
            .submit(&u, &request("https://example.com/app?id=x", "amazon"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[tokio::test]
    async fn test_url_without_app_id_creates_nothing() {
        let f = fixture(false);
        let u = user(&f, Plan::Free, 0, Some(5)).await;
        let err = f
            .service
            .submit(&u, &request("https://apps.apple.com/us/app/foo", "apple"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidAppUrl(_)));
        assert!(f.jobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_quota_boundary() {
        let url = "https://play.google.com/store/apps/details?id=com.example.app";

        let f = fixture(false);
        let u = user(&f, Plan::Free, 4, Some(5)).await;
        assert!(f.service.submit(&u, &request(url, "google")).await.is_ok());

        let f = fixture(false);
        let u = user(&f, Plan::Free, 5, Some(5)).await;
        let err = f.service.submit(&u, &request(url, "google")).await.unwrap_err();
        assert!(matches!(err, SubmitError::QuotaDenied(ref r) if r == "quota exceeded"));
        assert!(f.jobs.is_empty().await);
        assert!(f.dispatcher.dispatched.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_requires_plan() {
        let f = fixture(false);
        let u = user(&f, Plan::Starter, 0, Some(50)).await;
        let req = BatchSubmitRequest {
            urls: vec!["https://apps.apple.com/us/app/a/id1".to_string()],
            store: "apple".to_string(),
        };
        let err = f.service.submit_batch(&u, &req).await.unwrap_err();
        assert!(matches!(err, SubmitError::QuotaDenied(ref r) if r.contains("professional")));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let f = fixture(false);
        let u = user(&f, Plan::Professional, 0, Some(500)).await;
        let req = BatchSubmitRequest {
            urls: vec![
                "https://apps.apple.com/us/app/a/id1".to_string(),
                "https://apps.apple.com/us/app/no-id".to_string(),
            ],
            store: "apple".to_string(),
        };
        assert!(f.service.submit_batch(&u, &req).await.is_err());
        assert!(f.jobs.is_empty().await);

        let req = BatchSubmitRequest {
            urls: vec![
                "https://apps.apple.com/us/app/a/id1".to_string(),
                "https://apps.apple.com/us/app/b/id2".to_string(),
            ],
            store: "apple".to_string(),
        };
        let jobs = f.service.submit_batch(&u, &req).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(f.dispatcher.dispatched.lock().await.len(), 2);
        let ctx = f.users.subscription("user-1").await.unwrap().unwrap();
        assert_eq!(ctx.period_download_count, 2);
    }

    #[tokio::test]
    async fn test_dispatch_failure_marks_job_failed() {
        let f = fixture(true);
        let u = user(&f, Plan::Free, 0, Some(5)).await;
        let job = f
            .service
            .submit(&u, &request("https://apps.apple.com/us/app/foo/id42", "apple"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_reason.as_deref(), Some(DISPATCH_FAILED_REASON));
    }

    #[tokio::test]
    async fn test_saturated_dispatcher_rejects_before_creating() {
        let jobs = Arc::new(MemoryJobStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let dispatcher = Arc::new(RecordingDispatcher {
            spare: Some(1),
            ..RecordingDispatcher::default()
        });
        let service = SubmissionService::new(jobs.clone(), users.clone(), dispatcher.clone());
        let ctx = SubscriptionContext::new("user-1", Plan::Professional);
        users.upsert(ctx.clone()).await;

        let req = BatchSubmitRequest {
            urls: vec![
                "https://apps.apple.com/us/app/a/id1".to_string(),
                "https://apps.apple.com/us/app/b/id2".to_string(),
            ],
            store: "apple".to_string(),
        };
        let err = service.submit_batch(&ctx, &req).await.unwrap_err();
        assert!(matches!(err, SubmitError::Busy));
        assert!(jobs.is_empty().await);

        let ctx = users.subscription("user-1").await.unwrap().unwrap();
        assert_eq!(ctx.period_download_count, 0);

        // A single job still fits.
        let job = service
            .submit(&ctx, &request("https://apps.apple.com/us/app/a/id1", "apple"))
            .await
            .unwrap();
        assert_eq!(*dispatcher.dispatched.lock().await, vec![job.id]);
    }

    #[tokio::test]
    async fn test_usage_write_failure_still_dispatches() {
        let jobs = Arc::new(MemoryJobStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let service = SubmissionService::new(jobs.clone(), Arc::new(ReadOnlyUsers), dispatcher.clone());
        let ctx = SubscriptionContext::new("user-1", Plan::Free);

        let job = service
            .submit(&ctx, &request("https://apps.apple.com/us/app/foo/id7", "apple"))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(*dispatcher.dispatched.lock().await, vec![job.id]);
        assert_eq!(jobs.len().await, 1);
    }
}

//! Test helper utilities for API tests
//!
//! Spawns the router on an ephemeral port with in-memory stores, a local
//! artifact directory and an in-process worker pool.

#![allow(dead_code)]

use app_screenshots::{
    app_state::AppState,
    auth::{Claims, TokenVerifier},
    db::memory::{MemoryJobStore, MemoryUserDirectory},
    models::subscription::{Plan, SubscriptionContext},
    routes,
    services::{
        processor::{JobProcessor, ProcessorSettings},
        source::PlaceholderSource,
        storage::LocalArtifactStore,
        worker_pool::WorkerPool,
    },
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret";
pub const SCREENSHOTS_PER_APP: usize = 3;

pub const GOOGLE_URL: &str = "https://play.google.com/store/apps/details?id=com.example.app&hl=en";
pub const APPLE_URL: &str = "https://apps.apple.com/us/app/example-app/id123456789";

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub jobs: Arc<MemoryJobStore>,
    pub users: Arc<MemoryUserDirectory>,
    root: PathBuf,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_screenshots(SCREENSHOTS_PER_APP).await
    }

    /// Spawn with a source that yields `count` screenshots per app.
    pub async fn spawn_with_screenshots(count: usize) -> Self {
        let root = std::env::temp_dir().join(format!("app-screenshots-api-{}", Uuid::new_v4()));
        let jobs = Arc::new(MemoryJobStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let artifacts = Arc::new(LocalArtifactStore::new(root.join("artifacts")));

        let processor = Arc::new(JobProcessor::new(
            jobs.clone(),
            Arc::new(PlaceholderSource::new(count)),
            artifacts.clone(),
            ProcessorSettings {
                work_dir: root.join("work"),
                acquisition_timeout: Duration::from_secs(5),
                ..ProcessorSettings::default()
            },
        ));
        let pool = Arc::new(WorkerPool::spawn(processor, 2, 16));

        let state = AppState::new(
            jobs.clone(),
            users.clone(),
            artifacts,
            pool,
            TokenVerifier::new(JWT_SECRET),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, routes::router(state)).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            jobs,
            users,
            root,
        }
    }

    /// Register a user on `plan` and return a bearer token for them.
    pub async fn user(&self, user_id: &str, plan: Plan) -> String {
        self.users.upsert(SubscriptionContext::new(user_id, plan)).await;
        token_for(user_id)
    }

    pub async fn submit(&self, token: &str, url: &str, store: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/api/v1/screenshots", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "url": url, "store": store }))
            .send()
            .await
            .expect("Submit request failed")
    }

    pub async fn submit_batch(&self, token: &str, urls: &[&str], store: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/api/v1/screenshots/batch", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "urls": urls, "store": store }))
            .send()
            .await
            .expect("Batch request failed")
    }

    pub async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("GET request failed")
    }

    /// Poll a job until it reaches a terminal status.
    pub async fn wait_for_terminal(&self, token: &str, job_id: &str) -> Value {
        for _ in 0..100 {
            let job: Value = self
                .get(token, &format!("/api/v1/screenshots/{}", job_id))
                .await
                .json()
                .await
                .expect("Job body was not JSON");

            match job["status"].as_str() {
                Some("completed") | Some("failed") => return job,
                _ => sleep(Duration::from_millis(50)).await,
            }
        }
        panic!("Job {} did not finish in time", job_id);
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

pub fn token_for(user_id: &str) -> String {
    let exp = (chrono::Utc::now().timestamp() + 3600) as u64;
    encode(
        &Header::default(),
        &Claims {
            sub: user_id.to_string(),
            exp,
        },
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Names of the entries in a ZIP archive.
pub fn archive_entries(bytes: &[u8]) -> Vec<String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("Body was not a ZIP archive");
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::services::processor::ProcessorSettings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Unset runs on in-memory stores.
    pub database_url: Option<String>,

    /// Redis connection string. Unset processes jobs in-process.
    pub redis_url: Option<String>,

    /// HS256 secret used to verify bearer tokens
    pub jwt_secret: String,

    /// Root for per-job workspaces
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Archive directory when R2 is not configured
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// R2 bucket name
    pub r2_bucket: Option<String>,

    /// R2 endpoint URL
    pub r2_endpoint: Option<String>,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: Option<String>,

    /// AES-256-GCM key for archives stored in R2 (base64-encoded, 32 bytes)
    pub encryption_key: Option<String>,

    #[serde(default = "default_acquisition_timeout_secs")]
    pub acquisition_timeout_secs: u64,

    #[serde(default = "default_max_acquisition_attempts")]
    pub max_acquisition_attempts: u32,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_screenshots_per_app")]
    pub screenshots_per_app: usize,

    /// Jobs stuck in `processing` longer than this are failed at startup
    #[serde(default = "default_stall_after_secs")]
    pub stall_after_secs: u64,

    #[serde(default = "default_retain_workspaces")]
    pub retain_workspaces: bool,

    /// Plan given to unknown users in development mode
    #[serde(default = "default_dev_plan")]
    pub dev_plan: String,

    /// Prometheus scrape address served by the `worker` binary
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
}

/// R2 settings, present only when every piece is configured.
pub struct R2Settings<'a> {
    pub bucket: &'a str,
    pub endpoint: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub encryption_key: &'a str,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./data/work")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./data/archives")
}

fn default_acquisition_timeout_secs() -> u64 {
    60
}

fn default_max_acquisition_attempts() -> u32 {
    2
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_screenshots_per_app() -> usize {
    5
}

fn default_stall_after_secs() -> u64 {
    900
}

fn default_retain_workspaces() -> bool {
    true
}

fn default_dev_plan() -> String {
    "free".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn database_url(&self) -> Option<&str> {
        non_empty(&self.database_url)
    }

    pub fn redis_url(&self) -> Option<&str> {
        non_empty(&self.redis_url)
    }

    pub fn r2_settings(&self) -> Option<R2Settings<'_>> {
        Some(R2Settings {
            bucket: non_empty(&self.r2_bucket)?,
            endpoint: non_empty(&self.r2_endpoint)?,
            access_key: non_empty(&self.r2_access_key)?,
            secret_key: non_empty(&self.r2_secret_key)?,
            encryption_key: non_empty(&self.encryption_key)?,
        })
    }

    pub fn worker_metrics_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.worker_metrics_addr.trim().parse()
    }

    pub fn stall_after(&self) -> Duration {
        Duration::from_secs(self.stall_after_secs)
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            work_dir: self.work_dir.clone(),
            acquisition_timeout: Duration::from_secs(self.acquisition_timeout_secs),
            max_acquisition_attempts: self.max_acquisition_attempts,
            retain_workspaces: self.retain_workspaces,
        }
    }
}

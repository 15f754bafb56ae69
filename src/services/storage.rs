use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::path::PathBuf;
use uuid::Uuid;

use crate::services::encryption::{ArchiveCipher, CipherError};

/// Where finished archives live.
///
/// A locator returned by `put_archive` is what gets stored as the job's
/// `result_artifact`; only the store that produced it can resolve it.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put_archive(&self, job_id: Uuid, bytes: Vec<u8>) -> Result<String, StorageError>;

    /// Archive bytes, or `None` when nothing exists at `locator`.
    async fn open(&self, locator: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Archives on local disk, `<root>/<job_id>.zip`.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf, StorageError> {
        // Locators are bare file names; anything else never came from us.
        if locator.is_empty() || locator.contains(['/', '\\']) || locator.starts_with('.') {
            return Err(StorageError::BadLocator(locator.to_string()));
        }
        Ok(self.root.join(locator))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put_archive(&self, job_id: Uuid, bytes: Vec<u8>) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let locator = format!("{job_id}.zip");
        let final_path = self.root.join(&locator);
        // Write then rename so a reader never sees a half-written archive.
        let tmp_path = self.root.join(format!(".{job_id}.zip.tmp"));
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(locator)
    }

    async fn open(&self, locator: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(locator)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Archives in Cloudflare R2 (S3-compatible), encrypted at rest.
pub struct R2ArtifactStore {
    bucket: Box<Bucket>,
    cipher: ArchiveCipher,
}

impl R2ArtifactStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        cipher: ArchiveCipher,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket, cipher })
    }
}

#[async_trait]
impl ArtifactStore for R2ArtifactStore {
    async fn put_archive(&self, job_id: Uuid, bytes: Vec<u8>) -> Result<String, StorageError> {
        let key = format!("archives/{job_id}.zip");
        let sealed = self.cipher.seal(&key, &bytes)?;
        self.bucket
            .put_object_with_content_type(&key, &sealed, "application/octet-stream")
            .await?;
        Ok(key)
    }

    async fn open(&self, locator: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let response = match self.bucket.get_object(locator).await {
            Ok(r) => r,
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if response.status_code() == 404 {
            return Ok(None);
        }
        if response.status_code() >= 300 {
            return Err(StorageError::Config(format!(
                "unexpected R2 status {} for {locator}",
                response.status_code()
            )));
        }
        Ok(Some(self.cipher.open(locator, &response.to_vec())?))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive encryption failed: {0}")]
    Encryption(#[from] CipherError),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Malformed artifact locator: {0}")]
    BadLocator(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> (LocalArtifactStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("app-screenshots-store-{}", Uuid::new_v4()));
        (LocalArtifactStore::new(&root), root)
    }

    #[tokio::test]
    async fn test_local_put_then_open() {
        let (store, root) = scratch_store();
        let job_id = Uuid::new_v4();
        let locator = store.put_archive(job_id, b"PK-data".to_vec()).await.unwrap();
        assert_eq!(locator, format!("{job_id}.zip"));
        assert_eq!(store.open(&locator).await.unwrap().unwrap(), b"PK-data");
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_local_missing_is_none() {
        let (store, _root) = scratch_store();
        assert!(store.open("nope.zip").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_rejects_path_traversal() {
        let (store, _root) = scratch_store();
        assert!(matches!(
            store.open("../etc/passwd").await,
            Err(StorageError::BadLocator(_))
        ));
    }
}

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::services::source::Screenshot;

/// Per-job scratch directory, `<root>/<job_id>/`.
///
/// Jobs never share a workspace, so no locking is needed around it.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn for_job(root: &Path, job_id: Uuid) -> Self {
        Self {
            dir: root.join(job_id.to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write screenshots as `screenshot_01.png`, `screenshot_02.png`, ...
    ///
    /// Any leftovers from an earlier attempt are removed first.
    pub async fn materialize(&self, shots: &[Screenshot]) -> Result<Vec<PathBuf>, PackageError> {
        if tokio::fs::try_exists(&self.dir).await? {
            tokio::fs::remove_dir_all(&self.dir).await?;
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut written = Vec::with_capacity(shots.len());
        for (i, shot) in shots.iter().enumerate() {
            let path = self
                .dir
                .join(format!("screenshot_{:02}.{}", i + 1, shot.extension));
            tokio::fs::write(&path, &shot.data).await?;
            written.push(path);
        }
        Ok(written)
    }

    /// Bundle every file in the workspace into a deflate ZIP.
    pub async fn package(&self) -> Result<Vec<u8>, PackageError> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || zip_directory(&dir))
            .await
            .map_err(|e| PackageError::Join(e.to_string()))?
    }

    pub async fn remove(&self) -> Result<(), PackageError> {
        tokio::fs::remove_dir_all(&self.dir).await?;
        Ok(())
    }
}

fn zip_directory(dir: &Path) -> Result<Vec<u8>, PackageError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    if entries.is_empty() {
        return Err(PackageError::Empty);
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for path in &entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackageError::BadFileName(path.display().to_string()))?;
        writer.start_file(name, options)?;
        writer.write_all(&std::fs::read(path)?)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Nothing to package")]
    Empty,

    #[error("Unusable file name: {0}")]
    BadFileName(String),

    #[error("Packaging task failed: {0}")]
    Join(String),
}

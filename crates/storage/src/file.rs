use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::ParkingStatus;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::{BackendKind, StatusBackend};

/// Fallback backend: one pretty-printed JSON record, overwritten on each write.
/// Keeps no history.
///
/// Writers are serialized, and each write stages into its own temporary file
/// in the target directory before renaming it over the record.
#[derive(Clone, Debug)]
pub struct FileBackend {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StatusBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalFile
    }

    async fn load_latest(&self) -> Result<Option<ParkingStatus>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read '{}'", self.path.display()))
            }
        };
        let status = serde_json::from_str(&raw)
            .with_context(|| format!("'{}' does not hold a parking status", self.path.display()))?;
        Ok(Some(status))
    }

    async fn persist(&self, status: &ParkingStatus) -> Result<()> {
        let body = serde_json::to_vec_pretty(status).context("failed to encode parking status")?;

        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &body))
            .await
            .context("status file write task failed")?
    }
}

fn replace_file(path: &Path, body: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create parent directory '{}'", dir.display()))?;

    let mut staging = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to stage a write in '{}'", dir.display()))?;
    staging
        .write_all(body)
        .with_context(|| format!("failed to write '{}'", staging.path().display()))?;
    staging
        .persist(path)
        .with_context(|| format!("failed to replace '{}'", path.display()))?;
    Ok(())
}

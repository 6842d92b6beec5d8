//! Status Store: owns the single current [`ParkingStatus`] and the backend it
//! is persisted to.
//!
//! The backend is picked once in [`StatusStore::open`]. A configured and
//! reachable SQLite database is preferred; anything else falls back to a
//! single-record JSON file.

use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::ParkingStatus;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

mod file;
mod sqlite;

pub use file::FileBackend;
pub use sqlite::SqliteBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Multi-record store; reads resolve the newest row.
    Durable,
    /// Single overwritten record on local disk.
    LocalFile,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Durable => f.write_str("durable"),
            Self::LocalFile => f.write_str("local-file"),
        }
    }
}

#[async_trait]
pub trait StatusBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    /// The record with the highest `timestamp_raw`, if any was ever stored.
    async fn load_latest(&self) -> Result<Option<ParkingStatus>>;
    async fn persist(&self, status: &ParkingStatus) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("storage backend failure: {source}")]
    Storage { source: anyhow::Error },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Presence selects the durable backend.
    pub database_url: Option<String>,
    pub status_file: PathBuf,
}

#[derive(Clone)]
pub struct StatusStore {
    backend: Arc<dyn StatusBackend>,
    current: Arc<RwLock<ParkingStatus>>,
}

impl StatusStore {
    pub async fn open(config: &StoreConfig) -> Self {
        let backend: Arc<dyn StatusBackend> = match config.database_url.as_deref() {
            Some(database_url) => match SqliteBackend::connect(database_url).await {
                Ok(backend) => {
                    info!(%database_url, "using durable status backend");
                    Arc::new(backend)
                }
                Err(error) => {
                    warn!(
                        %database_url,
                        error = %format!("{error:#}"),
                        "durable backend unavailable; falling back to local file"
                    );
                    Arc::new(FileBackend::new(&config.status_file))
                }
            },
            None => {
                info!(
                    status_file = %config.status_file.display(),
                    "no database configured; using local file backend"
                );
                Arc::new(FileBackend::new(&config.status_file))
            }
        };
        Self::with_backend(backend).await
    }

    /// Wraps `backend`, seeding the in-memory record from it or from the sentinel.
    pub async fn with_backend(backend: Arc<dyn StatusBackend>) -> Self {
        let initial = match backend.load_latest().await {
            Ok(Some(status)) => {
                info!(
                    backend = %backend.kind(),
                    location = %status.location,
                    user = %status.user,
                    "loaded stored parking status"
                );
                status
            }
            Ok(None) => ParkingStatus::default(),
            Err(error) => {
                warn!(
                    backend = %backend.kind(),
                    error = %format!("{error:#}"),
                    "could not load stored parking status; starting from default"
                );
                ParkingStatus::default()
            }
        };
        Self {
            backend,
            current: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Current record. Never fails: backend errors fall back to the last known value.
    pub async fn read(&self) -> ParkingStatus {
        if self.backend.kind() == BackendKind::Durable {
            match self.backend.load_latest().await {
                Ok(Some(latest)) => {
                    let mut guard = self.current.write().await;
                    *guard = latest.clone();
                    return latest;
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        error = %format!("{error:#}"),
                        "durable backend read failed; serving last known status"
                    );
                }
            }
        }
        self.current.read().await.clone()
    }

    /// Validates and stores `candidate` as the new current record.
    ///
    /// On a durable persistence failure the in-memory record is left alone. The
    /// file backend updates it first, so a failed file write still changes what
    /// `read` returns.
    pub async fn write(&self, candidate: ParkingStatus) -> Result<ParkingStatus, StoreError> {
        validate(&candidate)?;

        match self.backend.kind() {
            BackendKind::Durable => {
                self.persist(&candidate).await?;
                *self.current.write().await = candidate.clone();
            }
            BackendKind::LocalFile => {
                // Held across the file write so memory and disk agree on the winner.
                let mut current = self.current.write().await;
                *current = candidate.clone();
                self.persist(&candidate).await?;
            }
        }

        info!(
            backend = %self.backend.kind(),
            location = %candidate.location,
            user = %candidate.user,
            timestamp_raw = candidate.timestamp_raw,
            "parking status updated"
        );
        Ok(candidate)
    }

    async fn persist(&self, status: &ParkingStatus) -> Result<(), StoreError> {
        self.backend.persist(status).await.map_err(|source| {
            warn!(
                backend = %self.backend.kind(),
                error = %format!("{source:#}"),
                "failed to persist parking status"
            );
            StoreError::Storage { source }
        })
    }
}

fn validate(candidate: &ParkingStatus) -> Result<(), StoreError> {
    if candidate.location.trim().is_empty() {
        return Err(StoreError::MissingField { field: "location" });
    }
    if candidate.user.trim().is_empty() {
        return Err(StoreError::MissingField { field: "user" });
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

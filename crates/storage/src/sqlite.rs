use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::ParkingStatus;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use crate::{BackendKind, StatusBackend};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable backend: every accepted write becomes a new row, and the current
/// status is whichever row carries the highest `timestamp_raw`.
///
/// Rows sharing the same `timestamp_raw` have no defined order; whichever one
/// SQLite returns first wins.
#[derive(Clone, Debug)]
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

impl SqliteBackend {
    pub async fn connect(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let in_memory = database_url.contains(":memory:");
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(ACQUIRE_TIMEOUT);
        pool_options = if in_memory {
            // Each in-memory connection is its own database.
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(5)
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run parking_status migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn latest(&self) -> Result<Option<ParkingStatus>> {
        let row = sqlx::query(
            "SELECT location, user_name, timestamp, timestamp_raw
             FROM parking_status
             ORDER BY timestamp_raw DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("failed to load latest parking status")?;
        Ok(row.map(status_from_row))
    }

    pub async fn insert(&self, status: &ParkingStatus) -> Result<i64> {
        let rec = sqlx::query(
            "INSERT INTO parking_status (location, user_name, timestamp, timestamp_raw)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&status.location)
        .bind(&status.user)
        .bind(&status.timestamp)
        .bind(status.timestamp_raw)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert parking status")?;
        Ok(rec.get::<i64, _>(0))
    }

    /// Newest-first history, for operators only.
    pub async fn history(&self, limit: u32) -> Result<Vec<ParkingStatus>> {
        let rows = sqlx::query(
            "SELECT location, user_name, timestamp, timestamp_raw
             FROM parking_status
             ORDER BY timestamp_raw DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to list parking status history")?;
        Ok(rows.into_iter().map(status_from_row).collect())
    }

    /// Deletes every row except the newest `keep`; returns how many went away.
    pub async fn prune(&self, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM parking_status
             WHERE id NOT IN (
                 SELECT id FROM parking_status
                 ORDER BY timestamp_raw DESC
                 LIMIT ?
             )",
        )
        .bind(keep)
        .execute(&self.pool)
        .await
        .context("failed to prune parking status history")?;
        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StatusBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }

    async fn load_latest(&self) -> Result<Option<ParkingStatus>> {
        self.latest().await
    }

    async fn persist(&self, status: &ParkingStatus) -> Result<()> {
        self.insert(status).await.map(|_| ())
    }
}

fn status_from_row(row: SqliteRow) -> ParkingStatus {
    ParkingStatus {
        location: row.get::<String, _>(0),
        user: row.get::<String, _>(1),
        timestamp: row.get::<String, _>(2),
        timestamp_raw: row.get::<i64, _>(3),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

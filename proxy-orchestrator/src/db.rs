//! SQLite setup for the credential cache.
//!
//! Requests for different workspaces read and upsert the cache concurrently,
//! so the database runs in WAL mode and writers wait on a busy lock instead of
//! failing immediately.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

const MAX_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the credential cache at `db_path`
#[instrument(fields(db_path = %db_path.display()))]
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Bring the `workspace_credentials` schema up to date
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    Ok(())
}

/// Copy an existing cache file aside before migrating it.
///
/// Returns `None` when there is no cache yet.
pub fn backup_database(db_path: &Path) -> Result<Option<PathBuf>> {
    if !db_path.exists() {
        return Ok(None);
    }

    let backup_path = db_path.with_extension(format!("db.backup.{}", chrono::Utc::now().timestamp()));
    std::fs::copy(db_path, &backup_path)?;

    Ok(Some(backup_path))
}

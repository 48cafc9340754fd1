//! SQLite storage for the code-intelligence engine.
//!
//! One pool is opened per process and shared by every component. Writes are
//! batched inside immediate transactions; readers run concurrently under WAL.

mod contexts;
mod memory;
mod repos;

pub use memory::*;
pub use repos::*;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(String),
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage backend shared by the indexer, query layer, sync, and tools.
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    /// Open (creating if needed) the database at the given path.
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        // WAL keeps readers concurrent with the single writer; foreign keys
        // drive the CASCADE deletes the data model relies on.
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database (tests).
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run all embedded migrations in order.
    ///
    /// Each migration is applied once, recorded in `schema_migrations`.
    /// Re-running is a no-op.
    pub async fn migrate_embedded(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let migrations: [(i64, &str); 3] = [
            (1, include_str!("../../../../migrations/0001_init.sql")),
            (2, include_str!("../../../../migrations/0002_memory.sql")),
            (
                3,
                include_str!("../../../../migrations/0003_workflow_and_sync.sql"),
            ),
        ];

        for (version, sql) in migrations {
            let applied: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM schema_migrations WHERE version = ?1")
                    .bind(version)
                    .fetch_optional(&self.pool)
                    .await?;
            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql).execute(&self.pool).await?;
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
                .bind(version)
                .bind(now_str())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Record a primary-key deletion for the sync deletion manifest.
    pub(crate) async fn record_deletion<'e, E>(
        executor: E,
        table: &str,
        row_id: &str,
    ) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_deletions (table_name, row_id, deleted_at)
             VALUES (?1, ?2, ?3)",
        )
        .bind(table)
        .bind(row_id)
        .bind(now_str())
        .execute(executor)
        .await?;
        Ok(())
    }
}

/// Current time as the canonical stored timestamp string.
pub(crate) fn now_str() -> String {
    format_ts(Utc::now())
}

pub(crate) fn format_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

pub(crate) fn parse_ts_opt(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.map(parse_ts)
}

// crates/db/src/lib.rs
//! SQLite persistence for burntop: daily usage records, message-level
//! dedup, streaks, and the derived leaderboard / benchmark caches.

pub mod benchmarks;
pub mod dedup;
pub mod leaderboard;
mod migrations;
pub mod money;
pub mod pricing_cache;
pub mod sessions;
pub mod streaks;
pub mod usage;
pub mod users;

pub use benchmarks::{BenchmarkRow, BenchmarkStore};
pub use dedup::DedupStore;
pub use leaderboard::{LeaderboardEntry, LeaderboardSort, LeaderboardStore};
pub use money::{cost_from_raw, cost_to_raw};
pub use pricing_cache::{PricingHandle, DEFAULT_PRICING_URL};
pub use sessions::SessionStore;
pub use streaks::{StreakRow, StreakStore, DEFAULT_AT_RISK_HOUR};
pub use usage::{UpsertCounts, UsageDelta, UsageRecordRow, UsageStore, UserStats, UserTotals};
pub use users::{NewUser, UserRow, UserStore};

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// True when a sqlx error is a unique-constraint violation. Expected on
/// concurrent dedup inserts and user registration races.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

/// Seconds since the Unix epoch, the storage form for all instants.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        Self::new_with_pool_size(path, 5).await
    }

    /// Open with an explicit pool size (configurable via server config).
    pub async fn new_with_pool_size(path: &Path, max_connections: u32) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .log_slow_statements(
                tracing::log::LevelFilter::Warn,
                std::time::Duration::from_secs(5),
            );

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    ///
    /// Uses `shared_cache(true)` so all pool connections share the same
    /// in-memory database. Without this, each connection gets its own
    /// separate database, breaking concurrent queries.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all inline migrations.
    ///
    /// Uses a `_migrations` table to track which migrations have already
    /// been applied, so that non-idempotent statements are only executed
    /// once.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1; // 1-based
            if version > current_version {
                sqlx::query(migration).execute(&self.pool).await?;
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Trivial connectivity probe for health checks.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get the path to the database file.
    /// Returns an empty path for in-memory databases.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn users(&self) -> UserStore {
        UserStore::new(self.clone())
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.clone())
    }

    pub fn dedup(&self) -> DedupStore {
        DedupStore::new(self.clone())
    }

    pub fn usage(&self) -> UsageStore {
        UsageStore::new(self.clone())
    }

    pub fn streaks(&self) -> StreakStore {
        StreakStore::new(self.clone())
    }

    pub fn leaderboard(&self) -> LeaderboardStore {
        LeaderboardStore::new(self.clone())
    }

    pub fn benchmarks(&self) -> BenchmarkStore {
        BenchmarkStore::new(self.clone())
    }
}

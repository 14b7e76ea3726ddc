//! Database handle
//!
//! A thin wrapper around the SQLite pool. The schema is embedded in the
//! binary and applied with [`Database::migrate`].

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::types::HealthResult;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) a file-backed database
    pub async fn connect(url: &str, max_connections: u32) -> HealthResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        tracing::info!(url, max_connections, "database connected");
        Ok(Self { pool })
    }

    /// Private in-memory database
    ///
    /// Every SQLite connection to `:memory:` is a separate database, so the
    /// pool holds exactly one connection and never recycles it.
    pub async fn in_memory() -> HealthResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Apply the embedded schema
    pub async fn migrate(&self) -> HealthResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("schema applied");
        Ok(())
    }

    /// Round trip to the database for health checks
    pub async fn ping(&self) -> HealthResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Transaction that holds the write lock from its first statement
    ///
    /// A deferred transaction that reads before writing cannot wait for the
    /// lock once another writer commits; SQLite answers `database is locked`
    /// at once. `BEGIN IMMEDIATE` queues on the busy timeout instead.
    pub async fn begin_write(&self) -> HealthResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

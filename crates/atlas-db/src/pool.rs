//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                   Database Connection Pool                          │
//! │                                                                     │
//! │  DbConfig::new(path) ── configure pool settings                     │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Database::new(config).await ── create pool + run migrations        │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  ┌──────────────────────────────────────┐                           │
//! │  │            SqlitePool                │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐     │  (max_connections)        │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ... │                           │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘     │                           │
//! │  └──────────────────────────────────────┘                           │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  Readers run in parallel on any connection; engine writers take     │
//! │  one connection each and serialize on SQLite's single write lock    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode + busy_timeout
//! WAL keeps readers and the writer out of each other's way. busy_timeout
//! bounds how long a writer waits for the write lock; on expiry the engine
//! surfaces a retryable `Contention` error instead of deadlocking.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::engine::StockEngine;
use crate::error::DbResult;
use crate::migrations;
use crate::repository::catalog::CatalogRepository;
use crate::repository::inventory::InventoryRepository;
use crate::repository::order::OrderRepository;
use crate::repository::stock_log::StockLogRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/atlas.db")
///     .max_connections(5)
///     .busy_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5 (sufficient for a handful of registers per branch)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    pub min_connections: u32,

    /// Pool acquire timeout.
    pub connect_timeout: Duration,

    /// How long a writer waits for SQLite's write lock before the
    /// operation fails with a retryable contention error.
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect. Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the write-lock wait bound.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// In-memory databases are per-connection, so the pool is capped at a
    /// single connection.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository and engine access.
///
/// Cheap to clone; all clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database and runs migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening database");

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await?;

        if config.run_migrations {
            migrations::run_migrations(&pool).await?;
        }

        Ok(Database { pool })
    }

    /// Returns the underlying pool (read paths and tests).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Takes one connection out of the pool and opens a write transaction
    /// with `BEGIN IMMEDIATE`.
    ///
    /// ## Why IMMEDIATE
    /// A deferred transaction only takes the write lock when it first
    /// writes. Two operations that both read a quantity and then try to
    /// write it would race to upgrade and one would fail mid-flight.
    /// IMMEDIATE acquires the write lock up front, so the read-then-write
    /// sequence inside the transaction can never interleave with another
    /// writer. Waiting is bounded by `busy_timeout`.
    ///
    /// The caller must finish with an explicit `COMMIT` or `ROLLBACK`
    /// (see the engine's `finish`).
    pub(crate) async fn begin_immediate(&self) -> DbResult<PoolConnection<Sqlite>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }

    /// Returns the ledger store (per-branch quantities).
    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone())
    }

    /// Returns the audit recorder (append-only stock log).
    pub fn stock_logs(&self) -> StockLogRepository {
        StockLogRepository::new(self.pool.clone())
    }

    /// Returns the order recorder.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    /// Returns the catalog lookups (products, branches).
    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    /// Returns the stock operation engine.
    pub fn engine(&self) -> StockEngine {
        StockEngine::new(self.clone())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

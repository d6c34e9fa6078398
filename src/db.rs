mod agents;
mod alarms;
mod beads;
mod coordination;
mod mail;
mod mappers;
mod review_queue;
mod towns;

#[cfg(test)]
mod store_tests;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::mask_database_url;
use crate::error::{GastownError, Result};
use crate::types::{Rig, RigId};

const SCHEMA_SQL: &str = include_str!("db/schema.sql");

/// Shared handle to the orchestration database.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `database_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is malformed or the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| GastownError::ConfigError(format!("Invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        ensure_parent_dir(&options.clone().get_filename())?;

        let pool = SqlitePoolOptions::new()
            .max_connections(resolve_pool_max_connections())
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                GastownError::DatabaseError(format!("Failed to connect to database: {e}"))
            })?;

        info!(url = %mask_database_url(database_url), "Connected to gastown database");
        Ok(Self { pool })
    }

    /// Private in-memory database with the schema applied.
    ///
    /// The pool holds exactly one connection that never expires, since every
    /// SQLite in-memory connection is its own database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be applied.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| GastownError::ConfigError(format!("Invalid database url: {e}")))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                GastownError::DatabaseError(format!("Failed to open in-memory database: {e}"))
            })?;

        let db = Self { pool };
        db.initialize_schema().await?;
        Ok(db)
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn initialize_schema(&self) -> Result<()> {
        for statement in schema_statements(SCHEMA_SQL) {
            sqlx::query(statement)
                .execute(self.pool())
                .await
                .map_err(|e| GastownError::DatabaseError(format!("Failed to apply schema: {e}")))?;
        }
        Ok(())
    }

    /// Storage handle restricted to one rig's rows.
    #[must_use]
    pub fn rig_store(&self, rig_id: RigId) -> RigStore {
        RigStore {
            db: self.clone(),
            rig_id,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Rig-scoped storage. Every query filters on `rig_id`; only the owning rig
/// actor holds one of these.
#[derive(Clone)]
pub struct RigStore {
    db: Database,
    rig_id: RigId,
}

impl RigStore {
    #[must_use]
    pub const fn rig_id(&self) -> &RigId {
        &self.rig_id
    }

    const fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// # Errors
    /// Returns `NotFound` when the rig row is gone.
    pub async fn rig(&self) -> Result<Rig> {
        self.db
            .get_rig(&self.rig_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("rig {}", self.rig_id)))
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.pool().begin().await.map_err(db_error("begin transaction"))
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool().acquire().await.map_err(db_error("acquire connection"))
    }
}

/// Connection type the transactional helpers operate on.
fn ensure_parent_dir(filename: &std::path::Path) -> Result<()> {
    if filename.as_os_str() == ":memory:" {
        return Ok(());
    }
    match filename.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| GastownError::DatabaseError(format!("Failed to create {}: {e}", parent.display()))),
        _ => Ok(()),
    }
}

pub(crate) type Conn = SqliteConnection;

pub(crate) fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> GastownError {
    move |e| GastownError::DatabaseError(format!("Failed to {action}: {e}"))
}

fn schema_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';')
        .map(str::trim)
        .filter(|statement| {
            statement
                .lines()
                .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
        })
}

fn resolve_pool_max_connections() -> u32 {
    resolve_pool_max_connections_from(|key| std::env::var(key).ok())
}

fn resolve_pool_max_connections_from<F>(env_lookup: F) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    env_lookup("GASTOWN_DB_MAX_CONNECTIONS")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(8)
}

//! Identity store backed by SQLite.
//!
//! Holds the five entity tables (`backends`, `contacts`, `connections`,
//! `messages` + tags, `delivery_reports`). Migration is applied inline via
//! `include_str!` on open.
//!
//! # Write pattern
//!
//! Row operations take `&mut SqliteConnection` so the connection resolver can
//! compose them with the default-route maintainer inside a single
//! transaction: every pre-image read and every downstream contact repair
//! commits or rolls back together with the triggering connection write.
//! Uniqueness constraints — `backends.name` and `connections
//! (backend_id, identity)` — are enforced by the schema, so racing creates
//! serialize through the store and the loser surfaces a database error.

use std::path::Path;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

pub mod backends;
pub mod connections;
pub mod contacts;
pub mod messages;

/// Errors from the identity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed (including uniqueness violations).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The requested row was not found.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind (e.g. "contact").
        entity: &'static str,
        /// The key that missed.
        key: String,
    },

    /// An entity-level invariant was violated; the write did not occur.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Handle to the identity store's connection pool.
pub struct IdentityStore {
    pool: SqlitePool,
}

impl IdentityStore {
    /// Open (or create) the store at the given path and apply the schema.
    ///
    /// Opens in WAL mode with foreign keys enforced — `ON DELETE SET NULL`
    /// on `contacts.default_connection_id` depends on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migration fails.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open identity store at {}", path.display()))?;

        let migration_sql = include_str!("../../migrations/001_schema.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&pool)
            .await
            .context("failed to apply identity store schema")?;

        Ok(Self { pool })
    }

    /// The underlying pool, for single-statement reads.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction for a resolver/maintainer unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a connection cannot be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }
}

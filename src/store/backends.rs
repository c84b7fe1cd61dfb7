//! Backend name registry rows.
//!
//! A `backends` row is not a transport implementation — those live in
//! [`crate::backend`]. It is a stable primary key per configured transport
//! so other entities can reference "which network" without holding the live
//! transport object. Rows are created once at process start, never mutated,
//! and never deleted while referenced.

use sqlx::SqliteConnection;

use super::StoreError;

/// Maximum length of a backend name, enforced by the schema as well.
pub const MAX_NAME_LEN: usize = 20;

/// A registered backend name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRecord {
    /// Primary key.
    pub id: i64,
    /// Unique transport name (e.g. "sms-gateway").
    pub name: String,
}

/// Look up a backend row by name, creating it if missing.
///
/// Called once per configured transport at process start. Idempotent.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if the name is empty or longer than
/// [`MAX_NAME_LEN`], or [`StoreError::Database`] on SQLite failure.
pub async fn ensure(conn: &mut SqliteConnection, name: &str) -> Result<BackendRecord, StoreError> {
    // Character count, matching the schema's `length(name)` CHECK.
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(StoreError::Validation(format!(
            "backend name must be 1..={MAX_NAME_LEN} characters: {name:?}"
        )));
    }
    sqlx::query("INSERT INTO backends (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    get(conn, name).await
}

/// Look up a backend's name by primary key.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if no backend with that id exists, or
/// [`StoreError::Database`] on SQLite failure.
pub async fn name_of(conn: &mut SqliteConnection, backend_id: i64) -> Result<String, StoreError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT name FROM backends WHERE id = ?1")
        .bind(backend_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|(name,)| name).ok_or_else(|| StoreError::NotFound {
        entity: "backend",
        key: backend_id.to_string(),
    })
}

/// Look up a backend row by name.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if no backend with that name is
/// registered, or [`StoreError::Database`] on SQLite failure.
pub async fn get(conn: &mut SqliteConnection, name: &str) -> Result<BackendRecord, StoreError> {
    let row: Option<(i64, String)> = sqlx::query_as("SELECT id, name FROM backends WHERE name = ?1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|(id, name)| BackendRecord { id, name })
        .ok_or_else(|| StoreError::NotFound {
            entity: "backend",
            key: name.to_owned(),
        })
}

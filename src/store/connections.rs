//! Connection rows: the pairing of a backend and an identity.
//!
//! A connection is the canonical link between a physical address (phone
//! number, email, nick) and a contact. The schema enforces that at most one
//! connection exists per `(backend_id, identity)` pair, so two resolver
//! calls racing on the same address serialize here — the loser of a create
//! race gets a uniqueness violation and retries as a steal.
//!
//! Writes to this table must go through [`crate::routing::resolver`], which
//! runs the default-route maintainer in the same transaction. The raw
//! `insert`/`update`/`delete` here deliberately carry no repair logic.

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use super::StoreError;

/// Row type returned by SQLite queries for connections.
type ConnectionRow = (i64, i64, String, Option<i64>);

/// A backend/identity pair, optionally linked to a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Primary key.
    pub id: i64,
    /// The backend this address belongs to.
    pub backend_id: i64,
    /// Transport-specific address string, opaque outside its backend.
    pub identity: String,
    /// The contact this address currently belongs to, if any.
    pub contact_id: Option<i64>,
}

fn from_row(row: ConnectionRow) -> Connection {
    Connection {
        id: row.0,
        backend_id: row.1,
        identity: row.2,
        contact_id: row.3,
    }
}

/// Load a connection by primary key.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if no connection matches, or
/// [`StoreError::Database`] on SQLite failure.
pub async fn load(conn: &mut SqliteConnection, connection_id: i64) -> Result<Connection, StoreError> {
    get(conn, connection_id)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            entity: "connection",
            key: connection_id.to_string(),
        })
}

/// Load a connection by primary key, `None` if absent.
///
/// The maintainer uses this for pre-image lookups, so it must read the
/// stored row, never in-memory values the caller is about to write.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn get(
    conn: &mut SqliteConnection,
    connection_id: i64,
) -> Result<Option<Connection>, StoreError> {
    let row: Option<ConnectionRow> = sqlx::query_as(
        "SELECT id, backend_id, identity, contact_id FROM connections WHERE id = ?1",
    )
    .bind(connection_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(from_row))
}

/// Look up the unique connection for a `(backend, identity)` pair.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn get_by_address(
    conn: &mut SqliteConnection,
    backend_id: i64,
    identity: &str,
) -> Result<Option<Connection>, StoreError> {
    let row: Option<ConnectionRow> = sqlx::query_as(
        "SELECT id, backend_id, identity, contact_id FROM connections \
         WHERE backend_id = ?1 AND identity = ?2",
    )
    .bind(backend_id)
    .bind(identity)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(from_row))
}

/// Insert a new connection row.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure, including the
/// uniqueness violation when the `(backend, identity)` pair already exists.
pub async fn insert(
    conn: &mut SqliteConnection,
    backend_id: i64,
    identity: &str,
    contact_id: Option<i64>,
) -> Result<Connection, StoreError> {
    let result = sqlx::query(
        "INSERT INTO connections (backend_id, identity, contact_id) VALUES (?1, ?2, ?3)",
    )
    .bind(backend_id)
    .bind(identity)
    .bind(contact_id)
    .execute(&mut *conn)
    .await?;
    Ok(Connection {
        id: result.last_insert_rowid(),
        backend_id,
        identity: identity.to_owned(),
        contact_id,
    })
}

/// Overwrite a connection's identity and contact.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure, including the
/// uniqueness violation when the new identity collides on this backend.
pub async fn update(conn: &mut SqliteConnection, connection: &Connection) -> Result<(), StoreError> {
    sqlx::query("UPDATE connections SET identity = ?1, contact_id = ?2 WHERE id = ?3")
        .bind(&connection.identity)
        .bind(connection.contact_id)
        .bind(connection.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete a connection row.
///
/// `contacts.default_connection_id` pointing here is nulled by the schema's
/// `ON DELETE SET NULL`.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn delete(conn: &mut SqliteConnection, connection_id: i64) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM connections WHERE id = ?1")
        .bind(connection_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

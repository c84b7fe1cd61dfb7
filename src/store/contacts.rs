//! Contact rows and route queries.
//!
//! A contact is the transport-agnostic entity a message is addressed to. Its
//! `default_connection_id` is an owning pointer in the weak sense: the
//! contact repoints it as routes come and go but never deletes the
//! connection itself. The invariant "a non-null default belongs to this
//! contact" is maintained by [`crate::routing::maintainer`].

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::trace;

use super::StoreError;

/// Row type returned by SQLite queries for contacts.
type ContactRow = (i64, String, String, Option<i64>);

/// A person or entity reachable via one or more connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Primary key.
    pub id: i64,
    /// Display name; empty means anonymous.
    pub name: String,
    /// Preferred language as a W3C language tag; empty falls back to the
    /// configured default at creation time.
    pub language: String,
    /// The connection outbound messages use when none is named explicitly.
    pub default_connection_id: Option<i64>,
}

impl Contact {
    /// Whether this contact has no display name.
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }
}

/// Insert a new contact row.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn create(
    conn: &mut SqliteConnection,
    name: &str,
    language: &str,
) -> Result<Contact, StoreError> {
    let result = sqlx::query("INSERT INTO contacts (name, language) VALUES (?1, ?2)")
        .bind(name)
        .bind(language)
        .execute(&mut *conn)
        .await?;
    let id = result.last_insert_rowid();
    trace!(contact_id = id, name, "contact created");
    Ok(Contact {
        id,
        name: name.to_owned(),
        language: language.to_owned(),
        default_connection_id: None,
    })
}

/// Insert a new contact after running the registered extensions over it.
///
/// This is the creation path process code should use; [`create`] is the raw
/// row insert.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn create_with_extensions(
    conn: &mut SqliteConnection,
    registry: &crate::extensions::ExtensionRegistry,
    mut new: crate::extensions::NewContact,
) -> Result<Contact, StoreError> {
    registry.apply(&mut new);
    create(conn, &new.name, &new.language).await
}

/// Load a contact by primary key.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if no contact matches, or
/// [`StoreError::Database`] on SQLite failure.
pub async fn load(conn: &mut SqliteConnection, contact_id: i64) -> Result<Contact, StoreError> {
    let row: ContactRow = sqlx::query_as(
        "SELECT id, name, language, default_connection_id FROM contacts WHERE id = ?1",
    )
    .bind(contact_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "contact",
        key: contact_id.to_string(),
    })?;
    Ok(Contact {
        id: row.0,
        name: row.1,
        language: row.2,
        default_connection_id: row.3,
    })
}

/// Repoint (or clear) a contact's default connection.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn set_default_connection(
    conn: &mut SqliteConnection,
    contact_id: i64,
    connection_id: Option<i64>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE contacts SET default_connection_id = ?1 WHERE id = ?2")
        .bind(connection_id)
        .bind(contact_id)
        .execute(&mut *conn)
        .await?;
    trace!(contact_id, ?connection_id, "default connection repointed");
    Ok(())
}

/// Count a contact's routes.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn route_count(conn: &mut SqliteConnection, contact_id: i64) -> Result<i64, StoreError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM connections WHERE contact_id = ?1")
            .bind(contact_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

/// A contact's route ids ordered by descending primary key.
///
/// Both maintainer tie-breaks walk routes in this order.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn route_ids_desc(
    conn: &mut SqliteConnection,
    contact_id: i64,
) -> Result<Vec<i64>, StoreError> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM connections WHERE contact_id = ?1 ORDER BY id DESC")
            .bind(contact_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

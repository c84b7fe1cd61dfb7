//! Connection resolution: the write path for the `connections` table.
//!
//! Every mutation of a connection goes through one of the entry points here
//! so the default-route maintainer runs on the same transaction as the
//! write. The composable variants take `&mut SqliteConnection` and expect
//! the caller to hold a transaction; [`resolve_or_steal`] and
//! [`remove_connection`] wrap one themselves.

use sqlx::SqliteConnection;
use tracing::{info, trace};

use crate::store::connections::{self, Connection};
use crate::store::{backends, contacts, IdentityStore};

use super::{maintainer, RoutingError};

/// Create a connection and run the post-save default adoption.
///
/// # Errors
///
/// Returns [`RoutingError::Store`] on store failure, including the
/// uniqueness violation when the `(backend, identity)` pair already exists —
/// the loser of a create race should retry as a steal.
pub async fn create_connection(
    conn: &mut SqliteConnection,
    backend_id: i64,
    identity: &str,
    contact_id: Option<i64>,
) -> Result<Connection, RoutingError> {
    let created = connections::insert(conn, backend_id, identity, contact_id).await?;
    maintainer::after_save(conn, &created).await?;
    Ok(created)
}

/// Persist changed identity/contact values and run the maintainer rules.
///
/// The pre-update rule reads the stored pre-image first, so callers may
/// freely mutate the in-memory [`Connection`] before calling this.
///
/// # Errors
///
/// Returns [`RoutingError::Store`] on store failure.
pub async fn save_connection(
    conn: &mut SqliteConnection,
    connection: &Connection,
) -> Result<(), RoutingError> {
    maintainer::before_contact_change(conn, connection.id, connection.contact_id).await?;
    connections::update(conn, connection).await?;
    maintainer::after_save(conn, connection).await?;
    Ok(())
}

/// Delete a connection and repair its owner's default route.
///
/// # Errors
///
/// Returns [`RoutingError::Store`] on store failure.
pub async fn delete_connection(
    conn: &mut SqliteConnection,
    connection_id: i64,
) -> Result<(), RoutingError> {
    let stored = connections::load(conn, connection_id).await?;
    connections::delete(conn, connection_id).await?;
    maintainer::after_delete(conn, &stored).await?;
    Ok(())
}

/// Resolve a raw identity to a connection owned by the given contact.
///
/// - Empty identity: no-op, returns `None`.
/// - The contact already has a default connection: its identity is
///   overwritten in place (rename semantics — a contact with a route keeps
///   that route rather than growing new ones).
/// - Otherwise the unique `(backend, identity)` connection is found or
///   created. If it currently belongs to a different contact — physical
///   addresses get recycled — it is **stolen**: reassigned to the claimant,
///   with the previous owner's default route repaired in the same
///   transaction.
///
/// # Errors
///
/// Returns [`RoutingError::Store`] on store failure, including uniqueness
/// violations when the overwritten identity collides on the backend.
pub async fn resolve_or_steal(
    store: &IdentityStore,
    contact_id: i64,
    backend_name: &str,
    raw_identity: &str,
) -> Result<Option<Connection>, RoutingError> {
    if raw_identity.is_empty() {
        return Ok(None);
    }

    let mut tx = store.begin().await?;
    let contact = contacts::load(&mut tx, contact_id).await?;

    let connection = if let Some(default_id) = contact.default_connection_id {
        let mut existing = connections::load(&mut tx, default_id).await?;
        trace!(
            connection_id = existing.id,
            identity = raw_identity,
            "repointing contact's existing default route"
        );
        existing.identity = raw_identity.to_owned();
        save_connection(&mut tx, &existing).await?;
        existing
    } else {
        let backend = backends::get(&mut tx, backend_name).await?;
        match connections::get_by_address(&mut tx, backend.id, raw_identity).await? {
            None => create_connection(&mut tx, backend.id, raw_identity, Some(contact_id)).await?,
            Some(mut held) => {
                info!(
                    connection_id = held.id,
                    old_contact = ?held.contact_id,
                    new_contact = contact_id,
                    "stealing connection for new claimant"
                );
                held.contact_id = Some(contact_id);
                held.identity = raw_identity.to_owned();
                save_connection(&mut tx, &held).await?;
                held
            }
        }
    };

    tx.commit().await.map_err(crate::store::StoreError::from)?;
    Ok(Some(connection))
}

/// Delete a connection in its own transaction.
///
/// # Errors
///
/// Returns [`RoutingError::Store`] on store failure.
pub async fn remove_connection(
    store: &IdentityStore,
    connection_id: i64,
) -> Result<(), RoutingError> {
    let mut tx = store.begin().await?;
    delete_connection(&mut tx, connection_id).await?;
    tx.commit().await.map_err(crate::store::StoreError::from)?;
    Ok(())
}

//! Default-route maintenance rules.
//!
//! Three procedures keep `contacts.default_connection_id` consistent as
//! connections are created, reassigned, and deleted. They mirror the write
//! they react to and must run on the same transaction as that write — the
//! resolver entry points in [`super::resolver`] do this; nothing else should
//! write the `connections` table.
//!
//! Tie-breaks are asymmetric on purpose: the pre-update rule walks the old
//! contact's routes by descending pk and skips the connection being taken,
//! while the post-delete repair takes the largest remaining pk with no
//! exclusion (the taken route is already gone from the set).

use sqlx::SqliteConnection;
use tracing::debug;

use crate::store::connections::{self, Connection};
use crate::store::{contacts, StoreError};

/// Pre-update rule: repair the previous owner before a reassignment lands.
///
/// Looks up the connection's stored row by primary key — the pre-image,
/// never the in-memory values the caller is about to write. A connection
/// with no stored predecessor is a no-op (first-time creation goes through
/// the post-save rule instead).
///
/// If the stored contact exists and `new_contact` clears or changes it:
/// with more than one route on the books (counted before the update lands,
/// so including the route being taken) the old contact's default is
/// repointed to its highest-pk route other than the one being taken;
/// otherwise the default is cleared.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn before_contact_change(
    conn: &mut SqliteConnection,
    connection_id: i64,
    new_contact: Option<i64>,
) -> Result<(), StoreError> {
    let Some(stored) = connections::get(conn, connection_id).await? else {
        return Ok(());
    };
    let Some(old_contact) = stored.contact_id else {
        return Ok(());
    };
    if new_contact == Some(old_contact) {
        return Ok(());
    }

    if contacts::route_count(conn, old_contact).await? > 1 {
        let candidate = contacts::route_ids_desc(conn, old_contact)
            .await?
            .into_iter()
            .find(|&id| id != connection_id);
        if let Some(replacement) = candidate {
            debug!(
                contact_id = old_contact,
                connection_id = replacement,
                "default route repointed ahead of reassignment"
            );
            contacts::set_default_connection(conn, old_contact, Some(replacement)).await?;
        }
    } else {
        debug!(contact_id = old_contact, "last route taken, default cleared");
        contacts::set_default_connection(conn, old_contact, None).await?;
    }
    Ok(())
}

/// Post-save rule: a contact with no default adopts the saved connection.
///
/// Runs after creation (a contact's first route always becomes its default)
/// and after steal-updates (the claimant adopts the stolen route if it had
/// none). Never overrides an existing default.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn after_save(
    conn: &mut SqliteConnection,
    connection: &Connection,
) -> Result<(), StoreError> {
    let Some(contact_id) = connection.contact_id else {
        return Ok(());
    };
    let contact = contacts::load(conn, contact_id).await?;
    if contact.default_connection_id.is_none() {
        debug!(
            contact_id,
            connection_id = connection.id,
            "connection adopted as default route"
        );
        contacts::set_default_connection(conn, contact_id, Some(connection.id)).await?;
    }
    Ok(())
}

/// Post-delete rule: repair the owner of a deleted connection.
///
/// The schema has already nulled the contact's default pointer if it
/// referenced the deleted row; [`repair_default`] then promotes a survivor.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn after_delete(
    conn: &mut SqliteConnection,
    deleted: &Connection,
) -> Result<(), StoreError> {
    match deleted.contact_id {
        Some(contact_id) => repair_default(conn, contact_id).await,
        None => Ok(()),
    }
}

/// Give a defaultless contact its highest-pk remaining route, if any.
///
/// No-op when the contact already has a default or has no routes left.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn repair_default(
    conn: &mut SqliteConnection,
    contact_id: i64,
) -> Result<(), StoreError> {
    let contact = contacts::load(conn, contact_id).await?;
    if contact.default_connection_id.is_some() {
        return Ok(());
    }
    if let Some(&survivor) = contacts::route_ids_desc(conn, contact_id).await?.first() {
        debug!(
            contact_id,
            connection_id = survivor,
            "default route repaired after deletion"
        );
        contacts::set_default_connection(conn, contact_id, Some(survivor)).await?;
    }
    Ok(())
}

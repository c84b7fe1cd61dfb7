//! Outbound dispatch: hand a payload to whatever router process is live.
//!
//! The router boundary is boolean: `submit` answers "was this accepted",
//! and a `false` surfaces as [`RoutingError::MessageSending`] whether the
//! backend rejected the payload or the pipeline aborted it. A router that
//! is not live at all raises [`RoutingError::NoRouter`] itself. Callers can
//! therefore discriminate "no route" / "no router" / "route exists but
//! delivery failed", which is all the resilience policy layered on top
//! needs.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::store::connections::{self, Connection};
use crate::store::messages::{self, Direction, NewMessage};
use crate::store::{contacts, IdentityStore, StoreError};

use super::RoutingError;

/// The router/backend submission seam consumed by outbound dispatch.
#[async_trait]
pub trait OutboundRouter: Send + Sync {
    /// Submit one outbound text through the connection's transport.
    ///
    /// Returns whether the submission was accepted.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::NoRouter`] when no live backend can take the
    /// submission, or [`RoutingError::Backend`] on transport failure.
    async fn submit(&self, connection: &Connection, text: &str) -> Result<bool, RoutingError>;
}

/// Send a text to a contact via its default connection.
///
/// # Errors
///
/// Returns [`RoutingError::NoConnection`] when the contact has no default
/// route (no dispatch is attempted), otherwise whatever
/// [`message_connection`] returns.
pub async fn message_contact(
    store: &IdentityStore,
    router: &dyn OutboundRouter,
    contact_id: i64,
    text: &str,
) -> Result<(), RoutingError> {
    let default_id = {
        let mut conn = store.pool().acquire().await.map_err(StoreError::from)?;
        contacts::load(&mut conn, contact_id)
            .await?
            .default_connection_id
            .ok_or(RoutingError::NoConnection)?
    };
    message_connection(store, router, default_id, text).await
}

/// Send a text over a specific connection.
///
/// An accepted submission is logged as an outgoing message row.
///
/// # Errors
///
/// Returns [`RoutingError::MessageSending`] when the router did not accept
/// the submission, [`RoutingError::NoRouter`]/[`RoutingError::Backend`]
/// propagated from the router, or [`RoutingError::Store`] on store failure.
pub async fn message_connection(
    store: &IdentityStore,
    router: &dyn OutboundRouter,
    connection_id: i64,
    text: &str,
) -> Result<(), RoutingError> {
    let connection = {
        let mut conn = store.pool().acquire().await.map_err(StoreError::from)?;
        connections::load(&mut conn, connection_id).await?
    };

    let accepted = router.submit(&connection, text).await?;
    if !accepted {
        return Err(RoutingError::MessageSending);
    }

    let mut tx = store.begin().await?;
    let logged = messages::save(
        &mut tx,
        &NewMessage {
            contact_id: None,
            connection_id: Some(connection.id),
            direction: Direction::Outgoing,
            date: Utc::now(),
            text: text.to_owned(),
        },
    )
    .await?;
    tx.commit().await.map_err(StoreError::from)?;

    debug!(
        message_id = logged.id,
        connection_id = connection.id,
        "outgoing message dispatched"
    );
    Ok(())
}

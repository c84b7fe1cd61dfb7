//! Routing: connection resolution, default-route maintenance, and outbound
//! dispatch.
//!
//! The consistency rules that used to be implicit save/delete hooks in older
//! designs are explicit procedures here ([`maintainer`]), invoked
//! synchronously by the resolver inside the same store transaction as the
//! triggering connection write. The dependency is visible in the call graph
//! and the atomicity boundary is the transaction the caller holds.

use crate::backend::BackendError;
use crate::store::StoreError;

pub mod dispatch;
pub mod maintainer;
pub mod resolver;

/// Errors from the routing layer.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// Identity store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The contact has no default connection to dispatch through.
    #[error("contact has no default connection")]
    NoConnection,

    /// The submission was not accepted — rejected by the backend or aborted
    /// in the outbound pipeline; the two are not distinguished here.
    #[error("message was not sent")]
    MessageSending,

    /// No live router/backend is available for the connection's transport.
    #[error("no router is active for backend {0:?}")]
    NoRouter(String),

    /// The transport failed while handling the submission.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

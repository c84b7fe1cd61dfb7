//! Switchboard — a message-routing core.
//!
//! Routes text traffic between pluggable transports ("backends") and a
//! population of contacts. Per-network addresses resolve to connections;
//! connections link to contacts; each contact keeps a default route that
//! stays consistent as routes are created, stolen, and deleted.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod extensions;
pub mod logging;
pub mod store;

pub mod backend;
pub mod router;
pub mod routing;

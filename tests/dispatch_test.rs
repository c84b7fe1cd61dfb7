//! Tests for outbound dispatch error discrimination.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use switchboard::routing::dispatch::{self, OutboundRouter};
use switchboard::routing::{resolver, RoutingError};
use switchboard::store::connections::Connection;
use switchboard::store::{backends, contacts, IdentityStore};

async fn open_temp_store() -> (IdentityStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = IdentityStore::open(&dir.path().join("switchboard.db"))
        .await
        .expect("open store");
    (store, dir)
}

/// A contact with one bound connection on the "bucket" backend.
async fn seeded(store: &IdentityStore) -> (i64, i64) {
    let mut tx = store.begin().await.expect("begin");
    let backend = backends::ensure(&mut tx, "bucket").await.expect("ensure");
    let contact = contacts::create(&mut tx, "alice", "en-us")
        .await
        .expect("contact");
    let connection = resolver::create_connection(&mut tx, backend.id, "+15550001", Some(contact.id))
        .await
        .expect("connection");
    tx.commit().await.expect("commit");
    (contact.id, connection.id)
}

/// Scripted router: counts submissions and answers with a fixed verdict.
struct ScriptedRouter {
    accept: bool,
    no_router: bool,
    submissions: AtomicUsize,
}

impl ScriptedRouter {
    fn accepting() -> Self {
        Self {
            accept: true,
            no_router: false,
            submissions: AtomicUsize::new(0),
        }
    }

    fn rejecting() -> Self {
        Self {
            accept: false,
            no_router: false,
            submissions: AtomicUsize::new(0),
        }
    }

    fn absent() -> Self {
        Self {
            accept: false,
            no_router: true,
            submissions: AtomicUsize::new(0),
        }
    }

    fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutboundRouter for ScriptedRouter {
    async fn submit(&self, _connection: &Connection, _text: &str) -> Result<bool, RoutingError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if self.no_router {
            return Err(RoutingError::NoRouter("bucket".to_owned()));
        }
        Ok(self.accept)
    }
}

#[tokio::test]
async fn contact_without_default_fails_before_dispatch() {
    let (store, _dir) = open_temp_store().await;
    let contact = {
        let mut tx = store.begin().await.expect("begin");
        let contact = contacts::create(&mut tx, "loner", "en-us")
            .await
            .expect("contact");
        tx.commit().await.expect("commit");
        contact.id
    };

    let router = ScriptedRouter::accepting();
    let result = dispatch::message_contact(&store, &router, contact, "hello").await;
    assert!(matches!(result, Err(RoutingError::NoConnection)));
    assert_eq!(router.submissions(), 0);
}

#[tokio::test]
async fn rejected_submission_is_a_sending_error() {
    let (store, _dir) = open_temp_store().await;
    let (contact, _) = seeded(&store).await;

    let router = ScriptedRouter::rejecting();
    let result = dispatch::message_contact(&store, &router, contact, "hello").await;
    assert!(matches!(result, Err(RoutingError::MessageSending)));
    assert_eq!(router.submissions(), 1);
}

#[tokio::test]
async fn no_router_error_passes_through() {
    let (store, _dir) = open_temp_store().await;
    let (contact, _) = seeded(&store).await;

    let router = ScriptedRouter::absent();
    let result = dispatch::message_contact(&store, &router, contact, "hello").await;
    assert!(matches!(result, Err(RoutingError::NoRouter(_))));
}

#[tokio::test]
async fn accepted_submission_logs_an_outgoing_message() {
    let (store, _dir) = open_temp_store().await;
    let (contact, connection) = seeded(&store).await;

    let router = ScriptedRouter::accepting();
    dispatch::message_contact(&store, &router, contact, "hello")
        .await
        .expect("dispatch");

    let (count, logged_contact, logged_connection): (i64, Option<i64>, Option<i64>) =
        sqlx::query_as(
            "SELECT COUNT(*), contact_id, connection_id FROM messages WHERE direction = 'O'",
        )
        .fetch_one(store.pool())
        .await
        .expect("query");
    assert_eq!(count, 1);
    assert_eq!(logged_connection, Some(connection));
    // Auto-populated from the connection's bound contact.
    assert_eq!(logged_contact, Some(contact));
}

#[tokio::test]
async fn message_connection_dispatches_without_a_contact() {
    let (store, _dir) = open_temp_store().await;
    let connection = {
        let mut tx = store.begin().await.expect("begin");
        let backend = backends::ensure(&mut tx, "bucket").await.expect("ensure");
        let connection = resolver::create_connection(&mut tx, backend.id, "+15550002", None)
            .await
            .expect("connection");
        tx.commit().await.expect("commit");
        connection.id
    };

    let router = ScriptedRouter::accepting();
    dispatch::message_connection(&store, &router, connection, "hello")
        .await
        .expect("dispatch");
    assert_eq!(router.submissions(), 1);
}

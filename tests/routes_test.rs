//! Tests for connection resolution and default-route maintenance.

use switchboard::routing::resolver;
use switchboard::store::{backends, connections, contacts, IdentityStore};

async fn open_temp_store() -> (IdentityStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = IdentityStore::open(&dir.path().join("switchboard.db"))
        .await
        .expect("open store");
    (store, dir)
}

/// Register the test backend and return its row id.
async fn bucket_backend(store: &IdentityStore) -> i64 {
    let mut tx = store.begin().await.expect("begin");
    let backend = backends::ensure(&mut tx, "bucket").await.expect("ensure");
    tx.commit().await.expect("commit");
    backend.id
}

async fn new_contact(store: &IdentityStore, name: &str) -> i64 {
    let mut tx = store.begin().await.expect("begin");
    let contact = contacts::create(&mut tx, name, "en-us")
        .await
        .expect("create contact");
    tx.commit().await.expect("commit");
    contact.id
}

async fn default_of(store: &IdentityStore, contact_id: i64) -> Option<i64> {
    let mut conn = store.pool().acquire().await.expect("acquire");
    contacts::load(&mut conn, contact_id)
        .await
        .expect("load contact")
        .default_connection_id
}

/// The invariant behind every maintenance rule: a non-null default points
/// at a connection owned by the same contact.
async fn assert_default_consistent(store: &IdentityStore, contact_id: i64) {
    let mut conn = store.pool().acquire().await.expect("acquire");
    let contact = contacts::load(&mut conn, contact_id)
        .await
        .expect("load contact");
    if let Some(default_id) = contact.default_connection_id {
        let default = connections::load(&mut conn, default_id)
            .await
            .expect("load default");
        assert_eq!(default.contact_id, Some(contact_id));
    }
}

#[tokio::test]
async fn first_connection_becomes_default() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    let mut tx = store.begin().await.expect("begin");
    let created = resolver::create_connection(&mut tx, backend, "+15550001", Some(alice))
        .await
        .expect("create");
    tx.commit().await.expect("commit");

    assert_eq!(default_of(&store, alice).await, Some(created.id));
    assert_default_consistent(&store, alice).await;
}

#[tokio::test]
async fn second_connection_does_not_override_default() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    let mut tx = store.begin().await.expect("begin");
    let first = resolver::create_connection(&mut tx, backend, "+15550001", Some(alice))
        .await
        .expect("first");
    resolver::create_connection(&mut tx, backend, "+15550002", Some(alice))
        .await
        .expect("second");
    tx.commit().await.expect("commit");

    assert_eq!(default_of(&store, alice).await, Some(first.id));
}

#[tokio::test]
async fn deleting_default_promotes_remaining_route() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    let mut tx = store.begin().await.expect("begin");
    let first = resolver::create_connection(&mut tx, backend, "+15550001", Some(alice))
        .await
        .expect("first");
    let second = resolver::create_connection(&mut tx, backend, "+15550002", Some(alice))
        .await
        .expect("second");
    tx.commit().await.expect("commit");
    assert_eq!(default_of(&store, alice).await, Some(first.id));

    resolver::remove_connection(&store, first.id)
        .await
        .expect("delete");

    assert_eq!(default_of(&store, alice).await, Some(second.id));
    assert_default_consistent(&store, alice).await;
}

#[tokio::test]
async fn deleting_last_route_leaves_default_cleared() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    let mut tx = store.begin().await.expect("begin");
    let only = resolver::create_connection(&mut tx, backend, "+15550001", Some(alice))
        .await
        .expect("create");
    tx.commit().await.expect("commit");

    resolver::remove_connection(&store, only.id)
        .await
        .expect("delete");

    assert_eq!(default_of(&store, alice).await, None);
}

// The two tie-breaks are deliberately asymmetric: the pre-update rule walks
// the old contact's routes by descending pk and skips the route being
// taken, while the post-delete repair takes the largest remaining pk with
// no exclusion. Both are pinned here.
#[tokio::test]
async fn reassigning_default_picks_largest_pk_skipping_taken_route() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;
    let bob = new_contact(&store, "bob").await;

    let mut tx = store.begin().await.expect("begin");
    let first = resolver::create_connection(&mut tx, backend, "+15550001", Some(alice))
        .await
        .expect("first");
    let second = resolver::create_connection(&mut tx, backend, "+15550002", Some(alice))
        .await
        .expect("second");
    let third = resolver::create_connection(&mut tx, backend, "+15550003", Some(alice))
        .await
        .expect("third");
    tx.commit().await.expect("commit");
    assert!(first.id < second.id && second.id < third.id);
    assert_eq!(default_of(&store, alice).await, Some(first.id));

    // Take alice's default away; the replacement walk must land on the
    // highest remaining pk, not merely the highest pk.
    let mut tx = store.begin().await.expect("begin");
    let mut taken = first.clone();
    taken.contact_id = Some(bob);
    resolver::save_connection(&mut tx, &taken).await.expect("steal");
    tx.commit().await.expect("commit");

    assert_eq!(default_of(&store, alice).await, Some(third.id));
    // Bob had no default, so he adopts the stolen route.
    assert_eq!(default_of(&store, bob).await, Some(first.id));
    assert_default_consistent(&store, alice).await;
    assert_default_consistent(&store, bob).await;
}

#[tokio::test]
async fn reassigning_highest_pk_default_does_not_leave_it_with_old_owner() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;
    let bob = new_contact(&store, "bob").await;

    let mut tx = store.begin().await.expect("begin");
    let first = resolver::create_connection(&mut tx, backend, "+15550001", Some(alice))
        .await
        .expect("first");
    let second = resolver::create_connection(&mut tx, backend, "+15550002", Some(alice))
        .await
        .expect("second");
    tx.commit().await.expect("commit");

    // Reassign the highest-pk route. Without the skip, the walk would hand
    // alice a default she no longer owns.
    let mut tx = store.begin().await.expect("begin");
    let mut taken = second.clone();
    taken.contact_id = Some(bob);
    resolver::save_connection(&mut tx, &taken).await.expect("steal");
    tx.commit().await.expect("commit");

    assert_eq!(default_of(&store, alice).await, Some(first.id));
    assert_default_consistent(&store, alice).await;
}

#[tokio::test]
async fn clearing_contact_of_only_route_clears_default() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    let mut tx = store.begin().await.expect("begin");
    let only = resolver::create_connection(&mut tx, backend, "+15550001", Some(alice))
        .await
        .expect("create");
    let mut unlinked = only.clone();
    unlinked.contact_id = None;
    resolver::save_connection(&mut tx, &unlinked)
        .await
        .expect("unlink");
    tx.commit().await.expect("commit");

    assert_eq!(default_of(&store, alice).await, None);
}

#[tokio::test]
async fn resolve_empty_identity_is_noop() {
    let (store, _dir) = open_temp_store().await;
    bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    let resolved = resolver::resolve_or_steal(&store, alice, "bucket", "")
        .await
        .expect("resolve");
    assert!(resolved.is_none());
}

#[tokio::test]
async fn resolve_creates_connection_and_default_for_new_address() {
    let (store, _dir) = open_temp_store().await;
    bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    let resolved = resolver::resolve_or_steal(&store, alice, "bucket", "+15550001")
        .await
        .expect("resolve")
        .expect("connection");
    assert_eq!(resolved.contact_id, Some(alice));
    assert_eq!(default_of(&store, alice).await, Some(resolved.id));
}

#[tokio::test]
async fn resolve_repoints_existing_default_instead_of_growing_routes() {
    let (store, _dir) = open_temp_store().await;
    bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    let original = resolver::resolve_or_steal(&store, alice, "bucket", "+15550001")
        .await
        .expect("resolve")
        .expect("connection");
    let renamed = resolver::resolve_or_steal(&store, alice, "bucket", "+15550099")
        .await
        .expect("resolve")
        .expect("connection");

    assert_eq!(renamed.id, original.id);
    assert_eq!(renamed.identity, "+15550099");

    let mut conn = store.pool().acquire().await.expect("acquire");
    assert_eq!(
        contacts::route_count(&mut conn, alice).await.expect("count"),
        1
    );
}

#[tokio::test]
async fn resolve_steals_address_owned_by_another_contact() {
    let (store, _dir) = open_temp_store().await;
    bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;
    let bob = new_contact(&store, "bob").await;

    let alices = resolver::resolve_or_steal(&store, alice, "bucket", "+15550001")
        .await
        .expect("resolve")
        .expect("connection");

    // The number got re-registered to bob.
    let stolen = resolver::resolve_or_steal(&store, bob, "bucket", "+15550001")
        .await
        .expect("resolve")
        .expect("connection");

    assert_eq!(stolen.id, alices.id);
    assert_eq!(stolen.contact_id, Some(bob));
    assert_eq!(default_of(&store, bob).await, Some(stolen.id));
    // It was alice's only route, so her default is cleared.
    assert_eq!(default_of(&store, alice).await, None);
    assert_default_consistent(&store, bob).await;
}

#[tokio::test]
async fn resolve_claims_contactless_connection() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;

    // First seen inbound: a connection with no contact yet.
    let mut tx = store.begin().await.expect("begin");
    let unclaimed = resolver::create_connection(&mut tx, backend, "+15550001", None)
        .await
        .expect("create");
    tx.commit().await.expect("commit");

    let claimed = resolver::resolve_or_steal(&store, alice, "bucket", "+15550001")
        .await
        .expect("resolve")
        .expect("connection");

    assert_eq!(claimed.id, unclaimed.id);
    assert_eq!(claimed.contact_id, Some(alice));
    assert_eq!(default_of(&store, alice).await, Some(claimed.id));
}

#[tokio::test]
async fn backend_identity_pair_is_unique() {
    let (store, _dir) = open_temp_store().await;
    let backend = bucket_backend(&store).await;
    let alice = new_contact(&store, "alice").await;
    let bob = new_contact(&store, "bob").await;

    let mut tx = store.begin().await.expect("begin");
    resolver::create_connection(&mut tx, backend, "+15550001", Some(alice))
        .await
        .expect("first insert");
    let duplicate = resolver::create_connection(&mut tx, backend, "+15550001", Some(bob)).await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn ensure_backend_twice_returns_same_row() {
    let (store, _dir) = open_temp_store().await;

    let mut tx = store.begin().await.expect("begin");
    let first = backends::ensure(&mut tx, "bucket").await.expect("first");
    let again = backends::ensure(&mut tx, "bucket").await.expect("again");
    tx.commit().await.expect("commit");

    assert_eq!(again.id, first.id);
    assert_eq!(again.name, "bucket");
}

#[tokio::test]
async fn backend_name_length_counts_characters_not_bytes() {
    let (store, _dir) = open_temp_store().await;

    let mut tx = store.begin().await.expect("begin");
    // 8 characters, 15 bytes; must pass the 20-character limit.
    backends::ensure(&mut tx, "шлюз-смс")
        .await
        .expect("multi-byte name");
    let too_long = backends::ensure(&mut tx, &"x".repeat(21)).await;
    assert!(too_long.is_err());
}

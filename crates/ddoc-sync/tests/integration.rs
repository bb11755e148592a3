//! End-to-end replication over the in-memory network.

use ddoc_clock::ClientId;
use ddoc_engine::DocError;
use ddoc_sync::{memory_network, MemoryTransport, SyncConfigBuilder, SyncedDocument};
use std::sync::Arc;
use std::time::Duration;

async fn settle_delivery() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

fn two_transports() -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
    let mut network = memory_network(2).into_iter();
    let a = Arc::new(network.next().unwrap());
    let b = Arc::new(network.next().unwrap());
    (a, b)
}

async fn join(
    session: &str,
    client: &str,
    transport: Arc<MemoryTransport>,
) -> SyncedDocument<MemoryTransport> {
    let config = SyncConfigBuilder::new().batch_interval(20).build();
    SyncedDocument::connect(session, "doc-1", ClientId::new(client), transport, config)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_field_edit_reaches_peer_on_interval() {
    let (ta, tb) = two_transports();
    let alice = join("session-1", "alice", ta).await;
    let bob = join("session-1", "bob", tb).await;

    alice.set_field("title", "Hello").unwrap();
    settle_delivery().await;

    assert_eq!(bob.get_field("title").unwrap(), Some("Hello".into()));
    let (accepted, discarded) = bob.guard_stats();
    assert!(accepted >= 1);
    assert_eq!(discarded, 0);
}

#[tokio::test]
async fn test_concurrent_text_edits_converge() {
    let (ta, tb) = two_transports();
    let alice = join("session-1", "alice", ta).await;
    let bob = join("session-1", "bob", tb).await;

    alice.insert_text("body", 0, "HELLO").unwrap();
    bob.insert_text("body", 0, "world").unwrap();
    settle_delivery().await;

    let a = alice.get_text("body").unwrap();
    let b = bob.get_text("body").unwrap();
    assert_eq!(a, b);
    assert!(a == "HELLOworld" || a == "worldHELLO", "interleaved: {a:?}");
}

#[tokio::test]
async fn test_explicit_flush_beats_the_interval() {
    let (ta, tb) = two_transports();
    let slow = SyncConfigBuilder::new().batch_interval(10_000).build();
    let alice = SyncedDocument::connect(
        "session-1",
        "doc-1",
        ClientId::new("alice"),
        ta,
        slow.clone(),
    )
    .await
    .unwrap();
    let bob = SyncedDocument::connect("session-1", "doc-1", ClientId::new("bob"), tb, slow)
        .await
        .unwrap();

    alice.set_field("title", "now").unwrap();
    alice.flush().await.unwrap();
    settle_delivery().await;

    assert_eq!(bob.get_field("title").unwrap(), Some("now".into()));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (ta, tb) = two_transports();
    let alice = join("session-1", "alice", ta).await;
    let stranger = join("session-2", "bob", tb).await;

    alice.set_field("title", "private").unwrap();
    alice.flush().await.unwrap();
    settle_delivery().await;

    assert_eq!(stranger.get_field("title").unwrap(), None);
    let (accepted, discarded) = stranger.guard_stats();
    assert_eq!(accepted, 0);
    assert!(discarded >= 1);
}

#[tokio::test]
async fn test_destroy_flushes_then_rejects() {
    let (ta, tb) = two_transports();
    let mut alice = join("session-1", "alice", ta).await;
    let bob = join("session-1", "bob", tb).await;

    alice.set_field("title", "last words").unwrap();
    alice.destroy().await.unwrap();
    settle_delivery().await;

    // The final flush still carried the pending edit.
    assert_eq!(bob.get_field("title").unwrap(), Some("last words".into()));

    assert!(alice.is_destroyed());
    assert!(matches!(
        alice.set_field("title", "too late"),
        Err(DocError::DocumentDestroyed(_))
    ));
    assert!(matches!(
        alice.get_field("title"),
        Err(DocError::DocumentDestroyed(_))
    ));
}

#[tokio::test]
async fn test_snapshot_bootstraps_late_joiner() {
    let (ta, tb) = two_transports();
    // Long interval: nothing replicates before the newcomer is seeded.
    let slow = SyncConfigBuilder::new().batch_interval(10_000).build();
    let alice = SyncedDocument::connect(
        "session-1",
        "doc-1",
        ClientId::new("alice"),
        ta,
        slow.clone(),
    )
    .await
    .unwrap();

    alice.set_field("title", "Notes").unwrap();
    alice.insert_text("body", 0, "Hello").unwrap();
    let snapshot = alice.snapshot().unwrap();

    let newcomer =
        SyncedDocument::connect("session-1", "doc-1", ClientId::new("carol"), tb, slow)
            .await
            .unwrap();
    newcomer.apply_snapshot(&snapshot).unwrap();

    assert_eq!(newcomer.get_field("title").unwrap(), Some("Notes".into()));
    assert_eq!(newcomer.get_text("body").unwrap(), "Hello");

    // The seeded replica participates in the session from there on.
    newcomer.insert_text("body", 5, "!").unwrap();
    assert_eq!(newcomer.get_text("body").unwrap(), "Hello!");
}

#[tokio::test]
async fn test_three_way_convergence_over_network() {
    let mut network = memory_network(3).into_iter();
    let docs = [
        join("session-1", "alice", Arc::new(network.next().unwrap())).await,
        join("session-1", "bob", Arc::new(network.next().unwrap())).await,
        join("session-1", "carol", Arc::new(network.next().unwrap())).await,
    ];

    docs[0].insert_array_element("items", 0, "a").unwrap();
    docs[1].insert_array_element("items", 0, "b").unwrap();
    docs[2].set_field("owner", "carol").unwrap();
    settle_delivery().await;

    let reference = docs[0].get_array("items").unwrap();
    assert_eq!(reference.len(), 2);
    for doc in &docs {
        assert_eq!(doc.get_array("items").unwrap(), reference);
        assert_eq!(doc.get_field("owner").unwrap(), Some("carol".into()));
    }
}

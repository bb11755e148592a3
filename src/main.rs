//! Two-replica demo: concurrent edits over an in-memory network that
//! converge once the batchers have flushed.

use ddoc_clock::ClientId;
use ddoc_sync::{memory_network, SyncConfigBuilder, SyncedDocument};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async_main());
}

async fn async_main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SyncConfigBuilder::new().batch_interval(25).build();
    let mut network = memory_network(2).into_iter();
    let transport_a = Arc::new(network.next().expect("two transports"));
    let transport_b = Arc::new(network.next().expect("two transports"));

    let mut alice = SyncedDocument::connect(
        "demo-session",
        "shared-notes",
        ClientId::new("alice"),
        transport_a,
        config.clone(),
    )
    .await
    .expect("connect alice");
    let mut bob = SyncedDocument::connect(
        "demo-session",
        "shared-notes",
        ClientId::new("bob"),
        transport_b,
        config,
    )
    .await
    .expect("connect bob");

    println!("=== driftdoc: two replicas, concurrent edits ===\n");

    // Both sides edit before anything has replicated.
    alice.set_field("title", "Meeting notes").expect("set title");
    alice.insert_text("body", 0, "Agenda: ").expect("insert");
    bob.insert_text("body", 0, "[draft] ").expect("insert");
    bob.insert_array_element("attendees", 0, "bob").expect("insert");
    alice.insert_array_element("attendees", 0, "alice").expect("insert");

    println!("before sync:");
    println!("  alice body: {:?}", alice.get_text("body").expect("read"));
    println!("  bob   body: {:?}", bob.get_text("body").expect("read"));

    tokio::time::sleep(Duration::from_millis(200)).await;

    println!("\nafter sync:");
    println!("  alice body: {:?}", alice.get_text("body").expect("read"));
    println!("  bob   body: {:?}", bob.get_text("body").expect("read"));
    println!(
        "  attendees (both): {:?}",
        alice.get_array("attendees").expect("read")
    );
    assert_eq!(
        alice.get_text("body").expect("read"),
        bob.get_text("body").expect("read")
    );

    let snapshot = alice.snapshot().expect("snapshot");
    println!(
        "\nsnapshot of {} at version {}:\n{}",
        snapshot.document_id,
        snapshot.version,
        serde_json::to_string_pretty(&snapshot).expect("serialize snapshot")
    );

    alice.destroy().await.expect("destroy alice");
    bob.destroy().await.expect("destroy bob");
    println!("\nreplicas destroyed, demo complete");
}

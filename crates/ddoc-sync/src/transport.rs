//! Transport abstractions for replication.

use async_trait::async_trait;
use ddoc_clock::{ClientId, VectorClock};
use ddoc_engine::Operation;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// One replication envelope: a batch of operations plus the sender's
/// identity and clock summary, addressed to a session and document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncMessage {
    pub session_id: String,
    pub client_id: ClientId,
    pub document_id: String,
    pub ops: Vec<Operation>,
    pub vclock: VectorClock,
}

#[derive(Clone, Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("transport disconnected")]
    Disconnected,
}

/// Abstract replication transport. A publish fans the envelope out to
/// every other member of the network; addressing and filtering happen
/// at the receiver.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Join the network.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Leave the network.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Fan an envelope out to all other members.
    async fn publish(&self, message: SyncMessage) -> Result<(), TransportError>;

    /// Take the inbound message stream. Single consumer.
    fn subscribe(&self) -> mpsc::Receiver<SyncMessage>;
}

type SharedInbox = Arc<RwLock<Option<mpsc::Receiver<SyncMessage>>>>;
type SharedOutgoing = Arc<RwLock<HashMap<String, mpsc::Sender<SyncMessage>>>>;

/// In-memory transport for testing and simulation.
pub struct MemoryTransport {
    name: String,
    inbox_tx: mpsc::Sender<SyncMessage>,
    inbox_rx: SharedInbox,
    outgoing: SharedOutgoing,
}

impl MemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            name: name.into(),
            inbox_tx: tx,
            inbox_rx: Arc::new(RwLock::new(Some(rx))),
            outgoing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Link two memory transports in both directions.
    pub fn link_with(&self, other: &MemoryTransport) {
        self.outgoing
            .write()
            .insert(other.name.clone(), other.inbox_tx.clone());
        other
            .outgoing
            .write()
            .insert(self.name.clone(), self.inbox_tx.clone());
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.outgoing.write().clear();
        Ok(())
    }

    async fn publish(&self, message: SyncMessage) -> Result<(), TransportError> {
        let senders: Vec<_> = {
            let outgoing = self.outgoing.read();
            outgoing.values().cloned().collect()
        };

        // A peer with a full or dropped inbox does not fail the publish.
        for tx in senders {
            let _ = tx.send(message.clone()).await;
        }
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<SyncMessage> {
        self.inbox_rx
            .write()
            .take()
            .expect("subscribe can only be called once")
    }
}

/// Create a fully linked network of memory transports for testing.
pub fn memory_network(count: usize) -> Vec<MemoryTransport> {
    let transports: Vec<_> = (0..count)
        .map(|i| MemoryTransport::new(format!("peer-{}", i)))
        .collect();

    for i in 0..count {
        for j in (i + 1)..count {
            transports[i].link_with(&transports[j]);
        }
    }

    transports
}

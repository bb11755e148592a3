//! A document wired to a transport: background flushing out,
//! guarded application in.

use crate::batcher::ReplicationBatcher;
use crate::config::SyncConfig;
use crate::guard::SessionGuard;
use crate::transport::{Transport, TransportError};
use ddoc_clock::{ClientId, VectorClock};
use ddoc_engine::{DocChange, DocError, DocumentState, Snapshot};
use ddoc_lane::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Document(#[from] DocError),
}

/// One replica's handle to a replicated document.
///
/// `connect` spawns two tasks: the batcher flushing the outbox on an
/// interval, and an inbound pump applying every envelope the guard
/// admits. All document access goes through one mutex, so local edits
/// and remote batches serialize.
pub struct SyncedDocument<T: Transport> {
    document: Arc<Mutex<DocumentState>>,
    guard: Arc<Mutex<SessionGuard>>,
    batcher: ReplicationBatcher<T>,
    transport: Arc<T>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: Transport> SyncedDocument<T> {
    /// Join a session: connect the transport and start replicating.
    pub async fn connect(
        session_id: impl Into<String>,
        document_id: impl Into<String>,
        client: ClientId,
        transport: Arc<T>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let session_id = session_id.into();
        let document_id = document_id.into();
        transport.connect().await?;
        info!(session = %session_id, document = %document_id, client = %client, "joining session");

        let document = Arc::new(Mutex::new(DocumentState::with_options(
            document_id.clone(),
            client.clone(),
            config.anchor_retry_limit,
            config.event_capacity,
        )));
        let guard = Arc::new(Mutex::new(SessionGuard::new(
            session_id.clone(),
            client,
            document_id,
        )));

        let batcher = ReplicationBatcher::new(
            session_id,
            Arc::clone(&transport),
            Arc::clone(&document),
            config.batch_interval_ms,
        );
        let flusher = tokio::spawn(batcher.clone().run());

        let mut inbound = transport.subscribe();
        let pump_doc = Arc::clone(&document);
        let pump_guard = Arc::clone(&guard);
        let pump = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let admitted = pump_guard.lock().admit(&message);
                if !admitted {
                    continue;
                }
                let result = {
                    let mut doc = pump_doc.lock();
                    doc.apply_remote_batch(&message.ops, &message.vclock)
                };
                match result {
                    Ok(()) => {}
                    Err(DocError::DocumentDestroyed(_)) => break,
                    Err(error) => {
                        warn!(from = %message.client_id, %error, "failed to apply remote batch");
                    }
                }
            }
        });

        Ok(Self {
            document,
            guard,
            batcher,
            transport,
            tasks: vec![flusher, pump],
        })
    }

    // ------------------------------------------------------------------
    // Document API
    // ------------------------------------------------------------------

    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<(), DocError> {
        self.document.lock().set_field(name, value)
    }

    pub fn delete_field(&self, name: &str) -> Result<(), DocError> {
        self.document.lock().delete_field(name)
    }

    pub fn get_field(&self, name: &str) -> Result<Option<Value>, DocError> {
        self.document.lock().get_field(name)
    }

    pub fn insert_text(&self, lane: &str, position: usize, text: &str) -> Result<(), DocError> {
        self.document.lock().insert_text(lane, position, text)
    }

    pub fn delete_text(&self, lane: &str, start: usize, length: usize) -> Result<(), DocError> {
        self.document.lock().delete_text(lane, start, length)
    }

    pub fn get_text(&self, lane: &str) -> Result<String, DocError> {
        self.document.lock().get_text(lane)
    }

    pub fn insert_array_element(
        &self,
        lane: &str,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<(), DocError> {
        self.document.lock().insert_array_element(lane, index, value)
    }

    pub fn delete_array_element(&self, lane: &str, index: usize) -> Result<(), DocError> {
        self.document.lock().delete_array_element(lane, index)
    }

    pub fn get_array(&self, lane: &str) -> Result<Vec<Value>, DocError> {
        self.document.lock().get_array(lane)
    }

    pub fn snapshot(&self) -> Result<Snapshot, DocError> {
        self.document.lock().snapshot()
    }

    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> Result<(), DocError> {
        self.document.lock().apply_snapshot(snapshot)
    }

    pub fn version(&self) -> u64 {
        self.document.lock().version()
    }

    pub fn vector_clock(&self) -> VectorClock {
        self.document.lock().vector_clock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocChange> {
        self.document.lock().subscribe()
    }

    // ------------------------------------------------------------------
    // Replication control
    // ------------------------------------------------------------------

    /// Push pending operations out now instead of waiting for the
    /// batch interval.
    pub async fn flush(&self) -> Result<(), SyncError> {
        self.batcher.flush().await?;
        Ok(())
    }

    /// (accepted, discarded) envelope counts for this session.
    pub fn guard_stats(&self) -> (u64, u64) {
        let guard = self.guard.lock();
        (guard.accepted(), guard.discarded())
    }

    pub fn is_destroyed(&self) -> bool {
        self.document.lock().is_destroyed()
    }

    /// Tear the replica down: one final flush, then the document is
    /// destroyed, tasks stop, and the transport leaves the network.
    /// Every later document call fails.
    pub async fn destroy(&mut self) -> Result<(), SyncError> {
        self.batcher.flush().await?;
        self.document.lock().destroy();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.transport.disconnect().await?;
        Ok(())
    }
}

impl<T: Transport> Drop for SyncedDocument<T> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

//! Periodic outbox drain.

use crate::transport::{SyncMessage, Transport, TransportError};
use ddoc_engine::DocumentState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Drains the document outbox on an interval and publishes each batch
/// as one envelope.
pub struct ReplicationBatcher<T: Transport> {
    session_id: String,
    transport: Arc<T>,
    document: Arc<Mutex<DocumentState>>,
    interval_ms: u64,
}

impl<T: Transport> Clone for ReplicationBatcher<T> {
    fn clone(&self) -> Self {
        Self {
            session_id: self.session_id.clone(),
            transport: Arc::clone(&self.transport),
            document: Arc::clone(&self.document),
            interval_ms: self.interval_ms,
        }
    }
}

impl<T: Transport> ReplicationBatcher<T> {
    pub fn new(
        session_id: impl Into<String>,
        transport: Arc<T>,
        document: Arc<Mutex<DocumentState>>,
        interval_ms: u64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            transport,
            document,
            interval_ms,
        }
    }

    /// Drain and publish whatever is pending. A no-op when the outbox
    /// is empty.
    pub async fn flush(&self) -> Result<(), TransportError> {
        // The lock must not be held across the publish await.
        let message = {
            let mut doc = self.document.lock();
            let ops = doc.take_pending();
            if ops.is_empty() {
                return Ok(());
            }
            trace!(count = ops.len(), "flushing operation batch");
            SyncMessage {
                session_id: self.session_id.clone(),
                client_id: doc.client().clone(),
                document_id: doc.document_id().to_string(),
                ops,
                vclock: doc.vector_clock().clone(),
            }
        };
        self.transport.publish(message).await
    }

    /// Flush loop; exits once the document is destroyed.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.interval_ms));
        loop {
            ticker.tick().await;
            if let Err(error) = self.flush().await {
                warn!(%error, "outbox flush failed");
            }
            if self.document.lock().is_destroyed() {
                break;
            }
        }
    }
}

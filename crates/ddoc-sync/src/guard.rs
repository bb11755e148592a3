//! Inbound envelope filtering.

use crate::transport::SyncMessage;
use ddoc_clock::ClientId;
use tracing::debug;

/// Decides which inbound envelopes reach the document: same session,
/// same document, not our own echo. Everything else is counted and
/// discarded.
pub struct SessionGuard {
    session_id: String,
    client_id: ClientId,
    document_id: String,
    accepted: u64,
    discarded: u64,
}

impl SessionGuard {
    pub fn new(
        session_id: impl Into<String>,
        client_id: ClientId,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client_id,
            document_id: document_id.into(),
            accepted: 0,
            discarded: 0,
        }
    }

    pub fn admit(&mut self, message: &SyncMessage) -> bool {
        let ok = message.session_id == self.session_id
            && message.document_id == self.document_id
            && message.client_id != self.client_id;
        if ok {
            self.accepted += 1;
        } else {
            self.discarded += 1;
            debug!(
                from = %message.client_id,
                session = %message.session_id,
                document = %message.document_id,
                "discarding envelope outside this session"
            );
        }
        ok
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddoc_clock::VectorClock;

    fn guard() -> SessionGuard {
        SessionGuard::new("session-1", ClientId::new("alice"), "doc-1")
    }

    fn envelope(session: &str, client: &str, document: &str) -> SyncMessage {
        SyncMessage {
            session_id: session.to_string(),
            client_id: ClientId::new(client),
            document_id: document.to_string(),
            ops: Vec::new(),
            vclock: VectorClock::new(),
        }
    }

    #[test]
    fn test_admits_peer_traffic_for_this_document() {
        let mut g = guard();
        assert!(g.admit(&envelope("session-1", "bob", "doc-1")));
        assert_eq!(g.accepted(), 1);
        assert_eq!(g.discarded(), 0);
    }

    #[test]
    fn test_discards_foreign_session() {
        let mut g = guard();
        assert!(!g.admit(&envelope("session-2", "bob", "doc-1")));
        assert_eq!(g.discarded(), 1);
    }

    #[test]
    fn test_discards_foreign_document() {
        let mut g = guard();
        assert!(!g.admit(&envelope("session-1", "bob", "doc-2")));
        assert_eq!(g.discarded(), 1);
    }

    #[test]
    fn test_discards_own_echo() {
        let mut g = guard();
        assert!(!g.admit(&envelope("session-1", "alice", "doc-1")));
        assert_eq!(g.discarded(), 1);
    }
}

//! Point-in-time capture of a document's visible state, used to
//! bootstrap a fresh replica without replaying operation history.

use crate::document::{ChangeOrigin, DocumentState};
use crate::error::{DocError, Result};
use ddoc_clock::{LamportTimestamp, VectorClock};
use ddoc_lane::{Element, ElementId, FieldRegister, Lane, SequenceKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Visible values only; tombstones and element metadata are not
/// carried. A snapshot therefore cannot be merged into a replica that
/// already holds history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub document_id: String,
    pub version: u64,
    pub fields: BTreeMap<String, Value>,
    pub texts: BTreeMap<String, String>,
    pub arrays: BTreeMap<String, Vec<Value>>,
    pub clock: VectorClock,
}

impl DocumentState {
    /// Capture the current visible state.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.ensure_active()?;
        let mut fields = BTreeMap::new();
        let mut texts = BTreeMap::new();
        let mut arrays = BTreeMap::new();
        for (name, lane) in &self.lanes {
            match lane {
                Lane::Field(register) => {
                    if let Some(value) = register.get() {
                        fields.insert(name.clone(), value.clone());
                    }
                }
                Lane::Sequence(seq) => match seq.kind() {
                    SequenceKind::Text => {
                        texts.insert(name.clone(), seq.materialize_text());
                    }
                    SequenceKind::List => {
                        arrays.insert(name.clone(), seq.materialize());
                    }
                },
            }
        }
        Ok(Snapshot {
            document_id: self.document_id.clone(),
            version: self.version,
            fields,
            texts,
            arrays,
            clock: self.vclock.clone(),
        })
    }

    /// Seed this replica from a snapshot.
    ///
    /// Only legal with no prior causal history: the snapshot carries
    /// visible values without element ids, so a replica that already
    /// holds elements would diverge from peers still anchoring to
    /// them. Seeded content mints fresh local stamps and does not go
    /// through the outbox.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.ensure_active()?;
        if snapshot.document_id != self.document_id {
            return Err(DocError::DocumentMismatch {
                snapshot: snapshot.document_id.clone(),
                document: self.document_id.clone(),
            });
        }
        if self.version != 0 || !self.lanes.is_empty() {
            return Err(DocError::SnapshotOntoLiveReplica);
        }

        let mut paths = Vec::new();
        for (name, value) in &snapshot.fields {
            let stamp = self.clock.tick();
            self.seed_field(name, value.clone(), stamp);
            paths.push(name.clone());
        }
        for (name, text) in &snapshot.texts {
            self.seed_sequence(
                name,
                SequenceKind::Text,
                text.chars().map(Value::from),
            )?;
            paths.push(name.clone());
        }
        for (name, values) in &snapshot.arrays {
            self.seed_sequence(name, SequenceKind::List, values.iter().cloned())?;
            paths.push(name.clone());
        }

        self.version = snapshot.version;
        self.vclock.merge(&snapshot.clock);
        let client = self.clock.client().clone();
        self.vclock.observe(&client, self.clock.current());

        paths.sort();
        self.notify(ChangeOrigin::Snapshot, paths);
        Ok(())
    }

    fn seed_field(&mut self, name: &str, value: Value, stamp: LamportTimestamp) {
        self.lanes.insert(
            name.to_string(),
            Lane::Field(FieldRegister::new(Some(value), stamp)),
        );
    }

    fn seed_sequence(
        &mut self,
        name: &str,
        kind: SequenceKind,
        values: impl Iterator<Item = Value>,
    ) -> Result<()> {
        let mut after: Option<ElementId> = None;
        for value in values {
            let id = ElementId(self.clock.tick());
            let element = Element::new(id.clone(), value, after.take());
            self.sequence_lane_mut(name, kind)?.integrate(element);
            after = Some(id);
        }
        // A lane present in the snapshot exists even when empty.
        if after.is_none() {
            self.sequence_lane_mut(name, kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddoc_clock::ClientId;

    fn populated() -> DocumentState {
        let mut d = DocumentState::new("doc-1", ClientId::new("alice"));
        d.set_field("title", "Notes").unwrap();
        d.set_field("draft", true).unwrap();
        d.delete_field("draft").unwrap();
        d.insert_text("body", 0, "Hello").unwrap();
        d.insert_array_element("tags", 0, "rust").unwrap();
        d.insert_array_element("tags", 1, "crdt").unwrap();
        d
    }

    #[test]
    fn test_snapshot_captures_visible_state_only() {
        let d = populated();
        let snap = d.snapshot().unwrap();

        assert_eq!(snap.document_id, "doc-1");
        assert_eq!(snap.version, d.version());
        assert_eq!(snap.fields.get("title"), Some(&"Notes".into()));
        // Tombstoned fields are omitted outright.
        assert!(!snap.fields.contains_key("draft"));
        assert_eq!(snap.texts.get("body").map(String::as_str), Some("Hello"));
        assert_eq!(
            snap.arrays.get("tags"),
            Some(&vec!["rust".into(), "crdt".into()])
        );
    }

    #[test]
    fn test_snapshot_seeds_a_fresh_replica() {
        let snap = populated().snapshot().unwrap();

        let mut fresh = DocumentState::new("doc-1", ClientId::new("bob"));
        fresh.apply_snapshot(&snap).unwrap();

        assert_eq!(fresh.get_field("title").unwrap(), Some("Notes".into()));
        assert_eq!(fresh.get_text("body").unwrap(), "Hello");
        assert_eq!(
            fresh.get_array("tags").unwrap(),
            vec!["rust".into(), "crdt".into()]
        );
        assert_eq!(fresh.version(), snap.version);
        // Seeding is a bootstrap, not authored content to replicate.
        assert_eq!(fresh.pending_ops(), 0);
        // The seeded replica can keep editing.
        fresh.insert_text("body", 5, "!").unwrap();
        assert_eq!(fresh.get_text("body").unwrap(), "Hello!");
    }

    #[test]
    fn test_snapshot_rejects_live_replica() {
        let snap = populated().snapshot().unwrap();

        let mut live = DocumentState::new("doc-1", ClientId::new("bob"));
        live.set_field("other", 1i64).unwrap();
        assert_eq!(
            live.apply_snapshot(&snap).unwrap_err(),
            DocError::SnapshotOntoLiveReplica
        );
    }

    #[test]
    fn test_snapshot_rejects_wrong_document() {
        let snap = populated().snapshot().unwrap();

        let mut other = DocumentState::new("doc-2", ClientId::new("bob"));
        assert!(matches!(
            other.apply_snapshot(&snap),
            Err(DocError::DocumentMismatch { .. })
        ));
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let snap = populated().snapshot().unwrap();
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_seed_notification_has_snapshot_origin() {
        let snap = populated().snapshot().unwrap();
        let mut fresh = DocumentState::new("doc-1", ClientId::new("bob"));
        let mut rx = fresh.subscribe();

        fresh.apply_snapshot(&snap).unwrap();
        let change = rx.try_recv().unwrap();
        assert_eq!(change.origin, ChangeOrigin::Snapshot);
        assert_eq!(
            change.paths,
            vec!["body".to_string(), "tags".to_string(), "title".to_string()]
        );
        assert!(rx.try_recv().is_err());
    }
}

//! Central document state: the lane table, the replica's clocks, a
//! monotonic version counter, and the outbox feeding replication.

use crate::error::{DocError, Result};
use crate::op::{OpPayload, Operation};
use ddoc_clock::{ClientId, LamportClock, LamportTimestamp, VectorClock};
use ddoc_lane::{Element, ElementId, FieldRegister, Lane, SequenceKind, SequenceLane, Value};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How many settle rounds a dependency-missing operation survives
/// before it is dropped (reported, not fatal).
pub const DEFAULT_ANCHOR_RETRY_LIMIT: u32 = 16;
/// Capacity of the change-notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Where a change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A local mutation call.
    Local,
    /// An accepted remote batch.
    Remote,
    /// Bootstrap seeding via `apply_snapshot`.
    Snapshot,
}

/// Emitted exactly once per successful mutation or applied remote
/// batch, carrying the new version and the mutated lane names.
#[derive(Clone, Debug)]
pub struct DocChange {
    pub version: u64,
    pub paths: Vec<String>,
    pub origin: ChangeOrigin,
}

/// One replica's full copy of a document.
///
/// Mutation, clock advancement, and notification happen atomically
/// within one call; there is no internal locking. Sharing a
/// `DocumentState` across tasks is the sync layer's job.
pub struct DocumentState {
    pub(crate) document_id: String,
    pub(crate) clock: LamportClock,
    pub(crate) vclock: VectorClock,
    pub(crate) version: u64,
    pub(crate) lanes: BTreeMap<String, Lane>,
    outbox: Vec<Operation>,
    destroyed: bool,
    events: broadcast::Sender<DocChange>,
    anchor_retry_limit: u32,
}

impl DocumentState {
    pub fn new(document_id: impl Into<String>, client: ClientId) -> Self {
        Self::with_options(
            document_id,
            client,
            DEFAULT_ANCHOR_RETRY_LIMIT,
            DEFAULT_EVENT_CAPACITY,
        )
    }

    pub fn with_options(
        document_id: impl Into<String>,
        client: ClientId,
        anchor_retry_limit: u32,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            document_id: document_id.into(),
            clock: LamportClock::new(client),
            vclock: VectorClock::new(),
            version: 0,
            lanes: BTreeMap::new(),
            outbox: Vec::new(),
            destroyed: false,
            events,
            anchor_retry_limit,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn client(&self) -> &ClientId {
        self.clock.client()
    }

    /// Count of applied operation batches; monotonic.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn vector_clock(&self) -> &VectorClock {
        &self.vclock
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DocChange> {
        self.events.subscribe()
    }

    /// Flip the terminal destroyed flag. Idempotent; every later API
    /// call fails with [`DocError::DocumentDestroyed`].
    pub fn destroy(&mut self) {
        if !self.destroyed {
            debug!(document = %self.document_id, "document destroyed");
        }
        self.destroyed = true;
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.destroyed {
            Err(DocError::DocumentDestroyed(self.document_id.clone()))
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Field lane API
    // ------------------------------------------------------------------

    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_active()?;
        let stamp = self.clock.tick();
        let op = Operation {
            target: name.to_string(),
            origin: self.clock.client().clone(),
            stamp,
            payload: OpPayload::FieldSet {
                value: value.into(),
            },
        };
        self.apply_to_lane(&op)?;
        self.commit_local(vec![op], name)
    }

    /// Write a delete tombstone. Shares LWW resolution with `set_field`
    /// rather than taking precedence over concurrent writes.
    pub fn delete_field(&mut self, name: &str) -> Result<()> {
        self.ensure_active()?;
        let stamp = self.clock.tick();
        let op = Operation {
            target: name.to_string(),
            origin: self.clock.client().clone(),
            stamp,
            payload: OpPayload::FieldDelete,
        };
        self.apply_to_lane(&op)?;
        self.commit_local(vec![op], name)
    }

    /// Current field value; `None` for absent or tombstoned fields.
    pub fn get_field(&self, name: &str) -> Result<Option<Value>> {
        self.ensure_active()?;
        match self.lanes.get(name) {
            None => Ok(None),
            Some(Lane::Field(register)) => Ok(register.get().cloned()),
            Some(other) => Err(DocError::LaneTypeMismatch {
                lane: name.to_string(),
                expected: "field",
                found: other.kind_name(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Text lane API
    // ------------------------------------------------------------------

    /// Insert text at a visible position, one element per character,
    /// each anchored to its predecessor.
    pub fn insert_text(&mut self, lane: &str, position: usize, text: &str) -> Result<()> {
        self.ensure_active()?;
        let mut after = self.sequence_anchor(lane, SequenceKind::Text, position)?;
        let mut ops = Vec::new();
        for ch in text.chars() {
            let stamp = self.clock.tick();
            let op = Operation {
                target: lane.to_string(),
                origin: self.clock.client().clone(),
                stamp,
                payload: OpPayload::SeqInsert {
                    after: after.take(),
                    value: ch.into(),
                    lane_kind: SequenceKind::Text,
                },
            };
            self.apply_to_lane(&op)?;
            after = Some(op.element_id());
            ops.push(op);
        }
        if ops.is_empty() {
            return Ok(());
        }
        self.commit_local(ops, lane)
    }

    /// Tombstone `length` visible characters starting at `start`.
    pub fn delete_text(&mut self, lane: &str, start: usize, length: usize) -> Result<()> {
        self.ensure_active()?;
        if length == 0 {
            return Ok(());
        }
        let ids: Vec<ElementId> = {
            let seq = self.expect_sequence(lane, SequenceKind::Text)?;
            let len = seq.visible_len();
            match start.checked_add(length) {
                Some(end) if end <= len => {}
                _ => {
                    return Err(DocError::IndexOutOfBounds {
                        index: start.saturating_add(length),
                        length: len,
                    })
                }
            }
            seq.visible()
                .skip(start)
                .take(length)
                .map(|element| element.id.clone())
                .collect()
        };
        let mut ops = Vec::with_capacity(ids.len());
        for element in ids {
            let stamp = self.clock.tick();
            let op = Operation {
                target: lane.to_string(),
                origin: self.clock.client().clone(),
                stamp,
                payload: OpPayload::SeqDelete {
                    element,
                    lane_kind: SequenceKind::Text,
                },
            };
            self.apply_to_lane(&op)?;
            ops.push(op);
        }
        self.commit_local(ops, lane)
    }

    /// The contiguous visible text of a lane; empty if never written.
    pub fn get_text(&self, lane: &str) -> Result<String> {
        self.ensure_active()?;
        match self.lanes.get(lane) {
            None => Ok(String::new()),
            Some(_) => Ok(self
                .expect_sequence(lane, SequenceKind::Text)?
                .materialize_text()),
        }
    }

    // ------------------------------------------------------------------
    // Array lane API
    // ------------------------------------------------------------------

    pub fn insert_array_element(
        &mut self,
        lane: &str,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.ensure_active()?;
        let after = self.sequence_anchor(lane, SequenceKind::List, index)?;
        let stamp = self.clock.tick();
        let op = Operation {
            target: lane.to_string(),
            origin: self.clock.client().clone(),
            stamp,
            payload: OpPayload::SeqInsert {
                after,
                value: value.into(),
                lane_kind: SequenceKind::List,
            },
        };
        self.apply_to_lane(&op)?;
        self.commit_local(vec![op], lane)
    }

    pub fn delete_array_element(&mut self, lane: &str, index: usize) -> Result<()> {
        self.ensure_active()?;
        let element = {
            let seq = self.expect_sequence(lane, SequenceKind::List)?;
            seq.id_at(index)
                .cloned()
                .ok_or(DocError::IndexOutOfBounds {
                    index,
                    length: seq.visible_len(),
                })?
        };
        let stamp = self.clock.tick();
        let op = Operation {
            target: lane.to_string(),
            origin: self.clock.client().clone(),
            stamp,
            payload: OpPayload::SeqDelete {
                element,
                lane_kind: SequenceKind::List,
            },
        };
        self.apply_to_lane(&op)?;
        self.commit_local(vec![op], lane)
    }

    /// The ordered visible elements of an array lane; empty if never
    /// written.
    pub fn get_array(&self, lane: &str) -> Result<Vec<Value>> {
        self.ensure_active()?;
        match self.lanes.get(lane) {
            None => Ok(Vec::new()),
            Some(_) => Ok(self
                .expect_sequence(lane, SequenceKind::List)?
                .materialize()),
        }
    }

    // ------------------------------------------------------------------
    // Remote application
    // ------------------------------------------------------------------

    /// Replay one remote operation. Used by tests and single-op paths;
    /// the inbound pipeline calls [`DocumentState::apply_remote_batch`].
    pub fn apply_remote(&mut self, op: &Operation) -> Result<()> {
        self.apply_remote_batch(std::slice::from_ref(op), &VectorClock::new())
    }

    /// Replay an accepted batch of remote operations, then merge the
    /// sender's vector clock.
    ///
    /// Clock advancement goes through `receive()` so happens-before is
    /// preserved. A malformed operation is skipped with a warning; it
    /// never poisons the rest of the batch or local state.
    pub fn apply_remote_batch(
        &mut self,
        ops: &[Operation],
        sender_clock: &VectorClock,
    ) -> Result<()> {
        self.ensure_active()?;
        let mut paths: Vec<String> = Vec::new();
        for op in ops {
            self.clock.receive(&op.stamp);
            if let Err(error) = self.apply_to_lane(op) {
                warn!(lane = %op.target, %error, "skipping malformed remote operation");
                continue;
            }
            self.vclock.observe(&op.origin, op.stamp.counter);
            paths.push(op.target.clone());
        }

        // New elements may unblock buffered operations. Every accepted
        // batch also charges a retry to operations still waiting, so an
        // orphan is dropped within a bounded number of batches even if
        // its own lane never hears another op.
        let limit = self.anchor_retry_limit;
        for (name, lane) in self.lanes.iter_mut() {
            if let Lane::Sequence(seq) = lane {
                if seq.pending_len() == 0 {
                    continue;
                }
                for element in seq.settle(limit) {
                    warn!(lane = %name, %element, "dropping operation whose anchor never arrived");
                }
            }
        }

        self.vclock.merge(sender_clock);
        self.version += 1;
        paths.sort();
        paths.dedup();
        self.notify(ChangeOrigin::Remote, paths);
        Ok(())
    }

    /// Drain operations buffered for replication; the batcher calls
    /// this on every flush. Returns nothing once destroyed.
    pub fn take_pending(&mut self) -> Vec<Operation> {
        if self.destroyed {
            return Vec::new();
        }
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_ops(&self) -> usize {
        self.outbox.len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn apply_to_lane(&mut self, op: &Operation) -> Result<()> {
        match &op.payload {
            OpPayload::FieldSet { value } => {
                self.field_write(&op.target, Some(value.clone()), op.stamp.clone())
            }
            OpPayload::FieldDelete => self.field_write(&op.target, None, op.stamp.clone()),
            OpPayload::SeqInsert {
                after,
                value,
                lane_kind,
            } => {
                let element = Element::new(op.element_id(), value.clone(), after.clone());
                let lane = self.sequence_lane_mut(&op.target, *lane_kind)?;
                lane.integrate(element);
                Ok(())
            }
            OpPayload::SeqDelete { element, lane_kind } => {
                let lane = self.sequence_lane_mut(&op.target, *lane_kind)?;
                lane.delete(element);
                Ok(())
            }
        }
    }

    fn field_write(
        &mut self,
        name: &str,
        value: Option<Value>,
        writer: LamportTimestamp,
    ) -> Result<()> {
        match self.lanes.get_mut(name) {
            None => {
                self.lanes
                    .insert(name.to_string(), Lane::Field(FieldRegister::new(value, writer)));
                Ok(())
            }
            Some(Lane::Field(register)) => {
                register.write(value, writer);
                Ok(())
            }
            Some(other) => Err(DocError::LaneTypeMismatch {
                lane: name.to_string(),
                expected: "field",
                found: other.kind_name(),
            }),
        }
    }

    pub(crate) fn sequence_lane_mut(
        &mut self,
        name: &str,
        kind: SequenceKind,
    ) -> Result<&mut SequenceLane> {
        let lane = self
            .lanes
            .entry(name.to_string())
            .or_insert_with(|| Lane::Sequence(SequenceLane::new(kind)));
        let found = lane.kind_name();
        match lane {
            Lane::Sequence(seq) if seq.kind() == kind => Ok(seq),
            _ => Err(DocError::LaneTypeMismatch {
                lane: name.to_string(),
                expected: kind_label(kind),
                found,
            }),
        }
    }

    fn expect_sequence(&self, name: &str, kind: SequenceKind) -> Result<&SequenceLane> {
        match self.lanes.get(name) {
            Some(Lane::Sequence(seq)) if seq.kind() == kind => Ok(seq),
            Some(other) => Err(DocError::LaneTypeMismatch {
                lane: name.to_string(),
                expected: kind_label(kind),
                found: other.kind_name(),
            }),
            None => Err(DocError::LaneTypeMismatch {
                lane: name.to_string(),
                expected: kind_label(kind),
                found: "absent",
            }),
        }
    }

    /// Resolve a visible position to the anchor element preceding it;
    /// `None` anchors at the head.
    fn sequence_anchor(
        &self,
        name: &str,
        kind: SequenceKind,
        position: usize,
    ) -> Result<Option<ElementId>> {
        match self.lanes.get(name) {
            None if position == 0 => Ok(None),
            None => Err(DocError::IndexOutOfBounds {
                index: position,
                length: 0,
            }),
            Some(_) => {
                let seq = self.expect_sequence(name, kind)?;
                let len = seq.visible_len();
                if position > len {
                    return Err(DocError::IndexOutOfBounds {
                        index: position,
                        length: len,
                    });
                }
                if position == 0 {
                    Ok(None)
                } else {
                    Ok(seq.id_at(position - 1).cloned())
                }
            }
        }
    }

    fn commit_local(&mut self, ops: Vec<Operation>, path: &str) -> Result<()> {
        self.version += 1;
        for op in &ops {
            self.vclock.observe(&op.origin, op.stamp.counter);
        }
        self.outbox.extend(ops);
        self.notify(ChangeOrigin::Local, vec![path.to_string()]);
        Ok(())
    }

    pub(crate) fn notify(&self, origin: ChangeOrigin, paths: Vec<String>) {
        // No receivers is fine; notifications are best-effort.
        let _ = self.events.send(DocChange {
            version: self.version,
            paths,
            origin,
        });
    }
}

fn kind_label(kind: SequenceKind) -> &'static str {
    match kind {
        SequenceKind::Text => "text",
        SequenceKind::List => "list",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(client: &str) -> DocumentState {
        DocumentState::new("doc-1", ClientId::new(client))
    }

    #[test]
    fn test_set_then_get_field() {
        let mut d = doc("alice");
        d.set_field("title", "Hello").unwrap();
        assert_eq!(d.get_field("title").unwrap(), Some("Hello".into()));
        assert_eq!(d.version(), 1);
    }

    #[test]
    fn test_delete_field_reads_as_absent() {
        let mut d = doc("alice");
        d.set_field("title", "Hello").unwrap();
        d.delete_field("title").unwrap();
        assert_eq!(d.get_field("title").unwrap(), None);
        assert_eq!(d.version(), 2);
    }

    #[test]
    fn test_insert_text_at_positions() {
        let mut d = doc("alice");
        d.insert_text("body", 0, "Hello").unwrap();
        d.insert_text("body", 5, " World").unwrap();
        assert_eq!(d.get_text("body").unwrap(), "Hello World");
    }

    #[test]
    fn test_delete_text_range() {
        let mut d = doc("alice");
        d.insert_text("body", 0, "Hello World").unwrap();
        d.delete_text("body", 5, 6).unwrap();
        assert_eq!(d.get_text("body").unwrap(), "Hello");
    }

    #[test]
    fn test_insert_text_in_middle() {
        let mut d = doc("alice");
        d.insert_text("body", 0, "Helo").unwrap();
        d.insert_text("body", 2, "l").unwrap();
        assert_eq!(d.get_text("body").unwrap(), "Hello");
    }

    #[test]
    fn test_array_insert_and_delete() {
        let mut d = doc("alice");
        d.insert_array_element("items", 0, "first").unwrap();
        d.insert_array_element("items", 1, "second").unwrap();
        assert_eq!(
            d.get_array("items").unwrap(),
            vec!["first".into(), "second".into()]
        );

        d.delete_array_element("items", 1).unwrap();
        assert_eq!(d.get_array("items").unwrap(), vec!["first".into()]);
    }

    #[test]
    fn test_reads_on_absent_lanes() {
        let d = doc("alice");
        assert_eq!(d.get_field("missing").unwrap(), None);
        assert_eq!(d.get_text("missing").unwrap(), "");
        assert!(d.get_array("missing").unwrap().is_empty());
    }

    #[test]
    fn test_lane_kind_is_sticky() {
        let mut d = doc("alice");
        d.set_field("title", "Hello").unwrap();
        let err = d.insert_text("title", 0, "x").unwrap_err();
        assert!(matches!(err, DocError::LaneTypeMismatch { .. }));

        d.insert_text("body", 0, "x").unwrap();
        assert!(matches!(
            d.get_array("body"),
            Err(DocError::LaneTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_positions() {
        let mut d = doc("alice");
        assert!(matches!(
            d.insert_text("body", 3, "x"),
            Err(DocError::IndexOutOfBounds { .. })
        ));
        d.insert_text("body", 0, "ab").unwrap();
        assert!(matches!(
            d.delete_text("body", 1, 5),
            Err(DocError::IndexOutOfBounds { length: 2, .. })
        ));
    }

    #[test]
    fn test_delete_text_rejects_overflowing_range() {
        let mut d = doc("alice");
        d.insert_text("body", 0, "ab").unwrap();
        assert!(matches!(
            d.delete_text("body", usize::MAX, 2),
            Err(DocError::IndexOutOfBounds { length: 2, .. })
        ));
        assert_eq!(d.get_text("body").unwrap(), "ab");
    }

    #[test]
    fn test_version_and_vclock_are_monotonic() {
        let mut d = doc("alice");
        let me = ClientId::new("alice");
        let mut last_version = 0;
        let mut last_counter = 0;
        for i in 0..5 {
            d.set_field("n", i as i64).unwrap();
            assert!(d.version() > last_version);
            assert!(d.vector_clock().get(&me) >= last_counter);
            last_version = d.version();
            last_counter = d.vector_clock().get(&me);
        }
    }

    #[test]
    fn test_outbox_collects_ops_until_drained() {
        let mut d = doc("alice");
        d.set_field("title", "Hello").unwrap();
        d.insert_text("body", 0, "Hi").unwrap();

        assert_eq!(d.pending_ops(), 3);
        let ops = d.take_pending();
        assert_eq!(ops.len(), 3);
        assert_eq!(d.pending_ops(), 0);
        assert!(d.take_pending().is_empty());
    }

    #[test]
    fn test_remote_batch_applies_and_merges_clock() {
        let mut a = doc("alice");
        let mut b = doc("bob");

        a.set_field("title", "Hello").unwrap();
        let ops = a.take_pending();
        let clock = a.vector_clock().clone();

        b.apply_remote_batch(&ops, &clock).unwrap();
        assert_eq!(b.get_field("title").unwrap(), Some("Hello".into()));
        assert_eq!(b.vector_clock().get(&ClientId::new("alice")), 1);
        assert_eq!(b.version(), 1);
        // Remote application does not re-buffer for replication.
        assert_eq!(b.pending_ops(), 0);
    }

    #[test]
    fn test_destroyed_document_rejects_everything() {
        let mut d = doc("alice");
        d.set_field("title", "Hello").unwrap();
        d.destroy();

        let destroyed = DocError::DocumentDestroyed("doc-1".to_string());
        assert_eq!(d.set_field("title", "x").unwrap_err(), destroyed);
        assert_eq!(d.get_field("title").unwrap_err(), destroyed);
        assert_eq!(d.insert_text("body", 0, "x").unwrap_err(), destroyed);
        assert_eq!(d.get_text("body").unwrap_err(), destroyed);
        assert_eq!(
            d.apply_remote_batch(&[], &VectorClock::new()).unwrap_err(),
            destroyed
        );
        assert!(d.take_pending().is_empty());
        assert_eq!(d.version(), 1);
    }

    #[test]
    fn test_every_mutation_notifies_once() {
        let mut d = doc("alice");
        let mut rx = d.subscribe();

        d.insert_text("body", 0, "Hi").unwrap();
        let change = rx.try_recv().unwrap();
        assert_eq!(change.version, 1);
        assert_eq!(change.paths, vec!["body".to_string()]);
        assert_eq!(change.origin, ChangeOrigin::Local);
        // One mutation, one event: nothing further queued.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remote_batch_notifies_with_remote_origin() {
        let mut a = doc("alice");
        let mut b = doc("bob");
        a.set_field("title", "Hello").unwrap();
        let ops = a.take_pending();

        let mut rx = b.subscribe();
        b.apply_remote_batch(&ops, a.vector_clock()).unwrap();
        let change = rx.try_recv().unwrap();
        assert_eq!(change.origin, ChangeOrigin::Remote);
        assert_eq!(change.paths, vec!["title".to_string()]);
    }
}

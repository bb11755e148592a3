//! The atomic unit of replicated change.

use ddoc_clock::{ClientId, LamportTimestamp};
use ddoc_lane::{ElementId, SequenceKind, Value};
use serde::{Deserialize, Serialize};

/// What an operation does to its target lane.
///
/// Operations are designed so that applying the same set in any order,
/// once sequence anchors are satisfied, converges to the same visible
/// state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OpPayload {
    /// LWW write of a field value.
    FieldSet { value: Value },
    /// LWW tombstone write; same conflict weight as `FieldSet`.
    FieldDelete,
    /// Sequence insert. The element id is the operation stamp, so the
    /// payload only carries the anchor and value.
    SeqInsert {
        after: Option<ElementId>,
        value: Value,
        lane_kind: SequenceKind,
    },
    /// Sequence tombstone.
    SeqDelete {
        element: ElementId,
        lane_kind: SequenceKind,
    },
}

/// One replicated operation, stamped by its origin replica.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Lane name this operation targets.
    pub target: String,
    /// Replica that generated the operation.
    pub origin: ClientId,
    /// Lamport stamp; globally unique, doubles as the operation id and
    /// as the element id of a sequence insert.
    pub stamp: LamportTimestamp,
    pub payload: OpPayload,
}

impl Operation {
    /// The element this operation creates, for sequence inserts.
    pub fn element_id(&self) -> ElementId {
        ElementId(self.stamp.clone())
    }
}

//! Anchor-ordered sequence lane shared by text and array editing.
//!
//! Each element records the id of the element it was inserted after.
//! Elements sharing an anchor are ordered descending by id, so every
//! replica computes the same traversal regardless of arrival order.
//! Deletion flips a tombstone and never removes the element: the
//! anchor chain stays valid for operations still in flight.

use crate::lane::SequenceKind;
use crate::value::Value;
use ddoc_clock::LamportTimestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of one sequence element: the Lamport stamp of the insert
/// that created it (`client:counter`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub LamportTimestamp);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One element of a sequence lane.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub value: Value,
    /// Anchor element; `None` anchors at the head of the lane.
    pub after: Option<ElementId>,
    pub tombstone: bool,
}

impl Element {
    pub fn new(id: ElementId, value: Value, after: Option<ElementId>) -> Self {
        Self {
            id,
            value,
            after,
            tombstone: false,
        }
    }
}

/// An operation whose dependency has not arrived yet.
#[derive(Clone, Debug)]
enum Pending {
    Insert { element: Element, retries: u32 },
    Delete { element: ElementId, retries: u32 },
}

impl Pending {
    fn id(&self) -> &ElementId {
        match self {
            Pending::Insert { element, .. } => &element.id,
            Pending::Delete { element, .. } => element,
        }
    }

    fn bump(&mut self) -> u32 {
        let retries = match self {
            Pending::Insert { retries, .. } => retries,
            Pending::Delete { retries, .. } => retries,
        };
        *retries += 1;
        *retries
    }
}

/// Anchor-ordered list CRDT.
///
/// Elements live in an arena owned by the lane; traversal walks the
/// anchor tree depth-first with siblings in descending id order.
#[derive(Clone, Debug)]
pub struct SequenceLane {
    kind: SequenceKind,
    arena: Vec<Element>,
    index: HashMap<ElementId, usize>,
    /// Elements anchored at the head, descending by id.
    roots: Vec<ElementId>,
    /// Elements anchored after a given element, descending by id.
    children: HashMap<ElementId, Vec<ElementId>>,
    pending: Vec<Pending>,
    dropped: u64,
}

impl SequenceLane {
    pub fn new(kind: SequenceKind) -> Self {
        Self {
            kind,
            arena: Vec::new(),
            index: HashMap::new(),
            roots: Vec::new(),
            children: HashMap::new(),
            pending: Vec::new(),
            dropped: 0,
        }
    }

    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// Place an element under its anchor, or buffer it until the
    /// anchor arrives. Returns false when buffered.
    pub fn integrate(&mut self, element: Element) -> bool {
        match self.try_place(element) {
            Ok(()) => true,
            Err(element) => {
                self.pending.push(Pending::Insert {
                    element,
                    retries: 0,
                });
                false
            }
        }
    }

    /// Tombstone an element. Unknown ids are buffered like inserts:
    /// the delete may have outrun its insert. Returns false when
    /// buffered.
    pub fn delete(&mut self, id: &ElementId) -> bool {
        if let Some(&idx) = self.index.get(id) {
            self.arena[idx].tombstone = true;
            true
        } else {
            self.pending.push(Pending::Delete {
                element: id.clone(),
                retries: 0,
            });
            false
        }
    }

    /// Re-drive buffered operations now that new anchors may exist.
    ///
    /// Runs passes until one makes no progress, then charges a retry
    /// to each survivor; entries that exhaust `retry_limit` are
    /// dropped and their ids returned for reporting.
    pub fn settle(&mut self, retry_limit: u32) -> Vec<ElementId> {
        loop {
            let queue = std::mem::take(&mut self.pending);
            let before = queue.len();
            for entry in queue {
                match entry {
                    Pending::Insert { element, retries } => {
                        if let Err(element) = self.try_place(element) {
                            self.pending.push(Pending::Insert { element, retries });
                        }
                    }
                    Pending::Delete { element, retries } => {
                        if let Some(&idx) = self.index.get(&element) {
                            self.arena[idx].tombstone = true;
                        } else {
                            self.pending.push(Pending::Delete { element, retries });
                        }
                    }
                }
            }
            if self.pending.len() == before {
                break;
            }
        }

        let mut dropped = Vec::new();
        let survivors = std::mem::take(&mut self.pending);
        for mut entry in survivors {
            if entry.bump() >= retry_limit {
                self.dropped += 1;
                dropped.push(entry.id().clone());
            } else {
                self.pending.push(entry);
            }
        }
        dropped
    }

    fn try_place(&mut self, element: Element) -> Result<(), Element> {
        if let Some(&idx) = self.index.get(&element.id) {
            // Duplicate delivery; only the tombstone flag can merge.
            if element.tombstone {
                self.arena[idx].tombstone = true;
            }
            return Ok(());
        }
        if let Some(anchor) = &element.after {
            if !self.index.contains_key(anchor) {
                return Err(element);
            }
        }

        let id = element.id.clone();
        let after = element.after.clone();
        let idx = self.arena.len();
        self.arena.push(element);
        self.index.insert(id.clone(), idx);

        let siblings = match after {
            None => &mut self.roots,
            Some(anchor) => self.children.entry(anchor).or_default(),
        };
        let pos = siblings
            .iter()
            .position(|sibling| *sibling < id)
            .unwrap_or(siblings.len());
        siblings.insert(pos, id);
        Ok(())
    }

    /// All elements in document order, tombstones included.
    pub fn ordered(&self) -> OrderedIter<'_> {
        let stack: Vec<&ElementId> = self.roots.iter().rev().collect();
        OrderedIter { lane: self, stack }
    }

    /// Visible elements in document order.
    pub fn visible(&self) -> impl Iterator<Item = &Element> {
        self.ordered().filter(|element| !element.tombstone)
    }

    pub fn visible_len(&self) -> usize {
        self.visible().count()
    }

    /// Id of the visible element at `index`.
    pub fn id_at(&self, index: usize) -> Option<&ElementId> {
        self.visible().nth(index).map(|element| &element.id)
    }

    /// The tombstone-filtered values in order.
    pub fn materialize(&self) -> Vec<Value> {
        self.visible().map(|element| element.value.clone()).collect()
    }

    /// Concatenation of the visible string values; the materialized
    /// form of a text lane.
    pub fn materialize_text(&self) -> String {
        self.visible()
            .filter_map(|element| element.value.as_str())
            .collect()
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.index.contains_key(id)
    }

    /// Total elements integrated, tombstones included.
    pub fn element_count(&self) -> usize {
        self.arena.len()
    }

    /// Buffered operations awaiting their dependency.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Operations dropped after exhausting their retries.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

/// Depth-first traversal over the anchor tree.
pub struct OrderedIter<'a> {
    lane: &'a SequenceLane,
    stack: Vec<&'a ElementId>,
}

impl<'a> Iterator for OrderedIter<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        if let Some(children) = self.lane.children.get(id) {
            for child in children.iter().rev() {
                self.stack.push(child);
            }
        }
        let idx = self.lane.index[id];
        Some(&self.lane.arena[idx])
    }
}

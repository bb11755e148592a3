//! Conflict-resolution lanes for the driftdoc engine.
//!
//! Every named attribute of a document lives in exactly one lane:
//!
//! - [`FieldRegister`]: last-writer-wins register for scalar/object
//!   fields; a delete is a tombstone write with the same conflict
//!   weight as any other write.
//! - [`SequenceLane`]: anchor-ordered list CRDT shared by text and
//!   array editing: insert-after-id placement, tombstone-on-delete,
//!   deterministic sibling ordering by element id.
//!
//! The [`Lane`] sum type lets the document treat both uniformly for
//! snapshotting and clock bookkeeping.

pub mod field;
pub mod lane;
pub mod sequence;
pub mod value;

pub use field::FieldRegister;
pub use lane::{Lane, SequenceKind};
pub use sequence::{Element, ElementId, SequenceLane};
pub use value::Value;

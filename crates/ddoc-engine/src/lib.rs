//! Replicated document engine.
//!
//! A [`DocumentState`] is one replica's copy of a named document: a
//! table of independently converging lanes (last-writer-wins fields,
//! anchor-ordered text and array sequences), a Lamport clock, a vector
//! clock summarizing everything applied so far, and an outbox of
//! locally authored operations awaiting replication.
//!
//! Local mutations stamp operations and apply them immediately; remote
//! batches replay through the same lane logic, so any two replicas that
//! see the same operation set converge regardless of delivery order or
//! duplication.

mod document;
mod error;
mod op;
mod snapshot;

pub use document::{
    ChangeOrigin, DocChange, DocumentState, DEFAULT_ANCHOR_RETRY_LIMIT, DEFAULT_EVENT_CAPACITY,
};
pub use error::{DocError, Result};
pub use op::{OpPayload, Operation};
pub use snapshot::Snapshot;

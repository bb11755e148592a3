//! Error types for the document engine.

use thiserror::Error;

/// Errors surfaced by document operations.
///
/// Conflict resolution is never an error: a lost LWW race or a
/// concurrent edit resolves silently per lane policy. These variants
/// cover programmer errors and contract violations only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocError {
    /// Any API call after `destroy()`. Not transient; never retried.
    #[error("document {0} is destroyed")]
    DocumentDestroyed(String),

    #[error("lane {lane}: expected {expected}, found {found}")]
    LaneTypeMismatch {
        lane: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("index {index} out of bounds (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    /// `apply_snapshot` is only legal on a replica with no prior
    /// causal history; seeding discards lane metadata the rest of the
    /// session may still reference.
    #[error("snapshot can only seed a replica with no prior history")]
    SnapshotOntoLiveReplica,

    #[error("snapshot is for document {snapshot}, not {document}")]
    DocumentMismatch { snapshot: String, document: String },
}

pub type Result<T> = std::result::Result<T, DocError>;

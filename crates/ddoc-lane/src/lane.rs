//! Lane dispatch: every named document attribute is either a scalar
//! LWW register or an anchor-ordered sequence.

use crate::field::FieldRegister;
use crate::sequence::SequenceLane;
use serde::{Deserialize, Serialize};

/// What a sequence lane materializes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SequenceKind {
    /// Character elements; materializes as a contiguous string.
    Text,
    /// Value elements; materializes as an ordered collection.
    List,
}

/// One named lane of a document.
///
/// The document schema is a map from attribute name to `Lane`; the sum
/// keeps snapshotting and clock bookkeeping uniform across lane types.
#[derive(Clone, Debug)]
pub enum Lane {
    Field(FieldRegister),
    Sequence(SequenceLane),
}

impl Lane {
    /// Human-readable lane kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Lane::Field(_) => "field",
            Lane::Sequence(lane) => match lane.kind() {
                SequenceKind::Text => "text",
                SequenceKind::List => "list",
            },
        }
    }

    pub fn as_field(&self) -> Option<&FieldRegister> {
        match self {
            Lane::Field(register) => Some(register),
            Lane::Sequence(_) => None,
        }
    }

    pub fn as_field_mut(&mut self) -> Option<&mut FieldRegister> {
        match self {
            Lane::Field(register) => Some(register),
            Lane::Sequence(_) => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceLane> {
        match self {
            Lane::Field(_) => None,
            Lane::Sequence(lane) => Some(lane),
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut SequenceLane> {
        match self {
            Lane::Field(_) => None,
            Lane::Sequence(lane) => Some(lane),
        }
    }
}

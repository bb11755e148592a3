//! Peer replication for driftdoc documents.
//!
//! A [`SyncedDocument`] wraps a document with a transport: locally
//! authored operations accumulate in the outbox and a background
//! batcher flushes them on an interval as one envelope; inbound
//! envelopes pass a [`SessionGuard`] (same session, same document, not
//! our own echo) before being replayed into the document.
//!
//! [`Transport`] is the seam for real networks; [`MemoryTransport`]
//! and [`memory_network`] cover tests and simulation.

mod batcher;
mod config;
mod guard;
mod synced;
mod transport;

pub use batcher::ReplicationBatcher;
pub use config::{SyncConfig, SyncConfigBuilder};
pub use guard::SessionGuard;
pub use synced::{SyncError, SyncedDocument};
pub use transport::{memory_network, MemoryTransport, SyncMessage, Transport, TransportError};

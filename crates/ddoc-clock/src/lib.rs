//! Causal clock primitives for the driftdoc engine.
//!
//! Two clock families live here:
//!
//! - [`LamportTimestamp`] / [`LamportClock`]: a single logical counter
//!   plus the originating replica, totally ordered by
//!   `(counter, client)`. Used as the per-operation tie-break key for
//!   last-writer-wins resolution and element identity.
//! - [`VectorClock`]: per-replica counters tracking the happens-before
//!   relation between replicas. Comparison yields one of four causal
//!   relations; `Concurrent` signals a genuine conflict that the lane
//!   policies resolve deterministically.

pub mod client;
pub mod lamport;
pub mod vector;

pub use client::ClientId;
pub use lamport::{LamportClock, LamportTimestamp};
pub use vector::{CausalOrder, VectorClock};

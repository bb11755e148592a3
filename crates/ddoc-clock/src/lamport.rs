//! Lamport timestamps and the per-replica logical clock.

use crate::client::ClientId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A Lamport timestamp: a logical counter paired with the replica that
/// produced it.
///
/// Timestamps are totally ordered by `(counter, client)`. Since no two
/// replicas share a `ClientId` and a replica never reuses a counter,
/// no two operations carry the same timestamp, which makes the order a
/// deterministic tie-break for concurrent writes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LamportTimestamp {
    /// The logical clock value when this timestamp was created.
    pub counter: u64,
    /// The replica that created it.
    pub client: ClientId,
}

impl LamportTimestamp {
    pub fn new(counter: u64, client: impl Into<ClientId>) -> Self {
        Self {
            counter,
            client: client.into(),
        }
    }
}

impl PartialOrd for LamportTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LamportTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.client.cmp(&other.client))
    }
}

impl std::fmt::Display for LamportTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.client, self.counter)
    }
}

/// The per-replica logical clock.
///
/// One `LamportClock` lives inside each document instance. Mutation of
/// a document is single-owner, so the clock needs no interior locking;
/// shared handles serialize access above this layer.
#[derive(Clone, Debug)]
pub struct LamportClock {
    counter: u64,
    client: ClientId,
}

impl LamportClock {
    pub fn new(client: ClientId) -> Self {
        Self { counter: 0, client }
    }

    /// Advance the clock for a locally generated operation and return
    /// its stamp.
    pub fn tick(&mut self) -> LamportTimestamp {
        self.counter += 1;
        LamportTimestamp {
            counter: self.counter,
            client: self.client.clone(),
        }
    }

    /// Absorb a remote stamp: the local counter jumps to
    /// `max(local, remote.counter) + 1`, preserving happens-before for
    /// everything stamped afterwards.
    pub fn receive(&mut self, remote: &LamportTimestamp) {
        self.counter = self.counter.max(remote.counter) + 1;
    }

    pub fn current(&self) -> u64 {
        self.counter
    }

    pub fn client(&self) -> &ClientId {
        &self.client
    }
}

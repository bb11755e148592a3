//! Vector clocks and four-way causal comparison.

use crate::client::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Causal relation between two vector clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CausalOrder {
    /// `self` happened before `other`.
    Before,
    /// `self` happened after `other`.
    After,
    /// Identical histories.
    Equal,
    /// Neither dominates: a genuine conflict requiring lane-level
    /// resolution.
    Concurrent,
}

/// Per-replica counters summarizing observed history.
///
/// Each entry is monotonically non-decreasing across a replica's
/// lifetime, locally and through merges. Merging is pointwise maximum.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<ClientId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (ClientId, u64)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// The counter observed for a replica, zero if never seen.
    pub fn get(&self, client: &ClientId) -> u64 {
        self.entries.get(client).copied().unwrap_or(0)
    }

    /// Bump a replica's component by one, returning the new value.
    pub fn increment(&mut self, client: &ClientId) -> u64 {
        let entry = self.entries.entry(client.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Raise a replica's component to at least `counter`.
    pub fn observe(&mut self, client: &ClientId, counter: u64) {
        let entry = self.entries.entry(client.clone()).or_insert(0);
        *entry = (*entry).max(counter);
    }

    /// Pointwise-maximum merge.
    pub fn merge(&mut self, other: &VectorClock) {
        for (client, &counter) in &other.entries {
            self.observe(client, counter);
        }
    }

    pub fn merged_with(&self, other: &VectorClock) -> VectorClock {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// True if `self[c] >= other[c]` for every component.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other
            .entries
            .iter()
            .all(|(client, &counter)| self.get(client) >= counter)
    }

    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        match (self.dominates(other), other.dominates(self)) {
            (true, true) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (false, false) => CausalOrder::Concurrent,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &u64)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

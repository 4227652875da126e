//! Per-neighbor record of which ids each neighbor is known to hold.
//!
//! The record is a lower bound: a neighbor may hold ids we have not recorded
//! (costing a redundant send), but we must never record an id the neighbor
//! does not hold, or that id would never be sent along this edge.
//!
//! Lock order: the [`MessageStore`](super::MessageStore) lock is never held
//! while a knowledge lock is taken. Callers snapshot the store first, release
//! it, then consult knowledge. Within this module the neighbor map lock is
//! released before a neighbor's own set is locked.

use crate::protocol::{MessageId, NodeId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type KnownSet = Arc<Mutex<HashSet<MessageId>>>;

/// Tracks, per neighbor, the ids that neighbor provably holds.
#[derive(Debug, Default)]
pub struct NeighborKnowledge {
    neighbors: RwLock<HashMap<NodeId, KnownSet>>,
}

impl NeighborKnowledge {
    /// Creates an empty record with no neighbors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole record with one empty set per neighbor.
    ///
    /// Entries for nodes that are no longer neighbors are discarded, and all
    /// previously acquired knowledge is forgotten.
    pub fn reset(&self, neighbors: &[NodeId]) {
        let fresh = neighbors
            .iter()
            .map(|n| (n.clone(), KnownSet::default()))
            .collect();
        *self.neighbors.write() = fresh;
    }

    fn entry(&self, neighbor: &NodeId) -> Option<KnownSet> {
        self.neighbors.read().get(neighbor).cloned()
    }

    /// Returns the ids in `all` that `neighbor` is not known to hold, sorted.
    ///
    /// A node that is not a tracked neighbor is assumed to hold nothing.
    #[must_use]
    pub fn delta(&self, neighbor: &NodeId, all: &HashSet<MessageId>) -> Vec<MessageId> {
        let mut missing: Vec<MessageId> = match self.entry(neighbor) {
            Some(known) => {
                let known = known.lock();
                all.iter().filter(|id| !known.contains(*id)).copied().collect()
            }
            None => all.iter().copied().collect(),
        };
        missing.sort_unstable();
        missing
    }

    /// Records that `neighbor` holds every id in `ids`.
    ///
    /// Returns false (and records nothing) if `neighbor` is not tracked.
    pub fn mark_known<'a, I>(&self, neighbor: &NodeId, ids: I) -> bool
    where
        I: IntoIterator<Item = &'a MessageId>,
    {
        let Some(known) = self.entry(neighbor) else {
            return false;
        };
        known.lock().extend(ids.into_iter().copied());
        true
    }

    /// Returns a copy of what `neighbor` is known to hold.
    #[must_use]
    pub fn known(&self, neighbor: &NodeId) -> Option<HashSet<MessageId>> {
        self.entry(neighbor).map(|known| known.lock().clone())
    }

    /// Returns true if `neighbor` is tracked.
    #[must_use]
    pub fn is_tracking(&self, neighbor: &NodeId) -> bool {
        self.neighbors.read().contains_key(neighbor)
    }

    /// Returns the tracked neighbors, sorted.
    #[must_use]
    pub fn neighbors(&self) -> Vec<NodeId> {
        let mut neighbors: Vec<_> = self.neighbors.read().keys().cloned().collect();
        neighbors.sort();
        neighbors
    }
}

//! The set of broadcast ids held by this node.

use crate::protocol::MessageId;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Append-only, concurrency-safe set of [`MessageId`]s.
///
/// Ids are never removed for the lifetime of the process. Callers only ever
/// see copies of the set; the lock is held for the duration of a single set
/// operation.
#[derive(Debug, Default)]
pub struct MessageStore {
    ids: RwLock<HashSet<MessageId>>,
}

impl MessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id`. Returns true if it was not already known.
    pub fn insert(&self, id: MessageId) -> bool {
        self.ids.write().insert(id)
    }

    /// Adds every id in `ids` and returns the ones that were new.
    pub fn merge<I>(&self, ids: I) -> Vec<MessageId>
    where
        I: IntoIterator<Item = MessageId>,
    {
        let mut known = self.ids.write();
        ids.into_iter().filter(|id| known.insert(*id)).collect()
    }

    /// Returns true if `id` is known.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.read().contains(id)
    }

    /// Returns a point-in-time copy of every known id.
    #[must_use]
    pub fn snapshot(&self) -> HashSet<MessageId> {
        self.ids.read().clone()
    }

    /// Returns every known id in ascending order.
    #[must_use]
    pub fn sorted(&self) -> Vec<MessageId> {
        let mut ids: Vec<_> = self.ids.read().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of known ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// Returns true if no id is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }
}

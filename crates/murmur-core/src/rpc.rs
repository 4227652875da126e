//! Request/response correlation.
//!
//! Every outstanding RPC owns one slot in [`PendingRequests`], keyed by the
//! `msg_id` it was sent with. A slot leaves the table in exactly one of two
//! ways: the reply arrives ([`PendingRequests::complete`]) or the caller gives
//! up ([`PendingRequests::expire`]). Replies for ids that are no longer pending
//! are reported back to the caller so they can be logged and dropped.

use crate::message::Envelope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// What happened to a reply handed to [`PendingRequests::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The reply was delivered to the waiting caller.
    Delivered,
    /// No request with this id is pending (it expired or never existed).
    Unmatched,
    /// The caller stopped waiting before the reply could be delivered.
    Abandoned,
}

/// Table of in-flight requests awaiting a reply.
#[derive(Debug, Default)]
pub struct PendingRequests {
    slots: Mutex<HashMap<u64, oneshot::Sender<Envelope>>>,
}

impl PendingRequests {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request and returns the receiver its reply will arrive on.
    ///
    /// Registering an id that is already pending replaces the old slot; the
    /// old receiver then observes a closed channel.
    pub fn register(&self, msg_id: u64) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(msg_id, tx);
        rx
    }

    /// Routes a reply to the request it answers.
    pub fn complete(&self, envelope: Envelope) -> Completion {
        let Some(msg_id) = envelope.body.in_reply_to else {
            return Completion::Unmatched;
        };
        let Some(tx) = self.slots.lock().remove(&msg_id) else {
            return Completion::Unmatched;
        };
        match tx.send(envelope) {
            Ok(()) => Completion::Delivered,
            Err(_) => Completion::Abandoned,
        }
    }

    /// Drops a pending request. Returns true if it was still pending.
    pub fn expire(&self, msg_id: u64) -> bool {
        self.slots.lock().remove(&msg_id).is_some()
    }

    /// Returns true if a request with this id is waiting for a reply.
    #[must_use]
    pub fn is_pending(&self, msg_id: u64) -> bool {
        self.slots.lock().contains_key(&msg_id)
    }

    /// Returns the number of requests waiting for a reply.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if no request is waiting for a reply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Allocates per-node `msg_id` values.
#[derive(Debug)]
pub struct MsgIdAllocator {
    next: AtomicU64,
}

impl MsgIdAllocator {
    /// Creates an allocator whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MsgIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

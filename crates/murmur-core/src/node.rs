//! Node handle: identity, outbound transport, and RPC correlation.

use crate::error::{BroadcastError, Result};
use crate::message::{Body, Envelope, Payload};
use crate::protocol::NodeId;
use crate::rpc::{Completion, MsgIdAllocator, PendingRequests};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Outbound side of the message transport.
///
/// Implementations hand the envelope to whatever carries it (stdout, an
/// in-memory router, ...). Sending must not block on the remote peer.
pub trait Transport: Send + Sync {
    /// Queues an envelope for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::TransportClosed`] if the transport has shut down.
    fn send(&self, envelope: Envelope) -> Result<()>;
}

impl Transport for mpsc::UnboundedSender<Envelope> {
    fn send(&self, envelope: Envelope) -> Result<()> {
        mpsc::UnboundedSender::send(self, envelope).map_err(|_| BroadcastError::TransportClosed)
    }
}

/// A cluster member as seen from inside the process.
pub struct Node {
    id: NodeId,
    members: Vec<NodeId>,
    transport: Arc<dyn Transport>,
    msg_ids: MsgIdAllocator,
    pending: PendingRequests,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("members", &self.members)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Removes an RPC's slot when the waiting future finishes or is dropped.
struct SlotGuard<'a> {
    pending: &'a PendingRequests,
    msg_id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pending.expire(self.msg_id);
    }
}

impl Node {
    /// Creates a node from the identity handed out during the init handshake.
    #[must_use]
    pub fn new(id: NodeId, members: Vec<NodeId>, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            members,
            transport,
            msg_ids: MsgIdAllocator::new(),
            pending: PendingRequests::new(),
        }
    }

    /// Returns this node's id.
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns every cluster member, including this node.
    #[must_use]
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Returns true if `id` is a known cluster member.
    #[must_use]
    pub fn is_member(&self, id: &NodeId) -> bool {
        self.members.contains(id)
    }

    /// Returns the table of outstanding RPCs.
    #[must_use]
    pub const fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Sends a message that expects no reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed.
    pub fn send(&self, dest: &NodeId, payload: Payload) -> Result<()> {
        self.transport.send(Envelope {
            src: self.id.clone(),
            dest: dest.clone(),
            body: Body::new(payload),
        })
    }

    /// Answers `request` with `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed.
    pub fn reply(&self, request: &Envelope, payload: Payload) -> Result<()> {
        self.reply_to(&request.src, request.body.msg_id, payload)
    }

    /// Sends `payload` to `dest` as the answer to request `in_reply_to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed.
    pub fn reply_to(&self, dest: &NodeId, in_reply_to: Option<u64>, payload: Payload) -> Result<()> {
        let mut body = Body::new(payload).with_msg_id(self.msg_ids.next_id());
        body.in_reply_to = in_reply_to;
        trace!(%dest, kind = body.payload.kind(), ?in_reply_to, "reply");
        self.transport.send(Envelope {
            src: self.id.clone(),
            dest: dest.clone(),
            body,
        })
    }

    /// Sends a request and waits up to `timeout` for the correlated reply.
    ///
    /// An `error` reply is returned as [`BroadcastError::Remote`]. A request
    /// that times out leaves nothing behind in the pending table; a reply that
    /// shows up later is dropped by [`Node::complete`].
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, transport failure, or an `error` reply.
    pub async fn rpc(&self, dest: &NodeId, payload: Payload, timeout: Duration) -> Result<Payload> {
        let msg_id = self.msg_ids.next_id();
        let rx = self.pending.register(msg_id);
        let _guard = SlotGuard {
            pending: &self.pending,
            msg_id,
        };

        trace!(%dest, msg_id, kind = payload.kind(), "rpc");
        self.transport.send(Envelope {
            src: self.id.clone(),
            dest: dest.clone(),
            body: Body::new(payload).with_msg_id(msg_id),
        })?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(envelope)) => match envelope.body.payload {
                Payload::Error { code, text } => Err(BroadcastError::Remote {
                    peer: envelope.src,
                    code,
                    text,
                }),
                payload => Ok(payload),
            },
            Ok(Err(_)) => Err(BroadcastError::TransportClosed),
            Err(_) => Err(BroadcastError::Timeout {
                peer: dest.clone(),
                msg_id,
            }),
        }
    }

    /// Routes an inbound reply to the RPC waiting for it.
    pub fn complete(&self, envelope: Envelope) -> Completion {
        let src = envelope.src.clone();
        let in_reply_to = envelope.body.in_reply_to;
        let completion = self.pending.complete(envelope);
        if completion != Completion::Delivered {
            debug!(%src, ?in_reply_to, ?completion, "dropping reply with no waiting request");
        }
        completion
    }
}

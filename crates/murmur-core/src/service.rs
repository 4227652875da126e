//! Request handling for broadcast, read, topology and gossip.
//!
//! [`BroadcastService`] is the one object that owns all per-node state. It is
//! built once after the init handshake and shared (behind an `Arc`) with the
//! dispatch loop and the [`GossipScheduler`](crate::gossip::GossipScheduler).
//! Handlers only touch in-memory state; nothing here waits on another node.

use crate::error::{BroadcastError, Result};
use crate::gossip::{GossipConfig, MessageStore, NeighborKnowledge};
use crate::message::{Envelope, Payload, TopologyMap};
use crate::node::Node;
use crate::protocol::{MessageId, NodeId};
use crate::topology::{TopologyConfig, resolve_neighbors};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-node broadcast state and the handlers that operate on it.
#[derive(Debug)]
pub struct BroadcastService {
    node: Arc<Node>,
    store: MessageStore,
    knowledge: NeighborKnowledge,
    topology: TopologyConfig,
    // Serialises topology installs so the neighbor list and knowledge keys
    // always come from the same install.
    install: Mutex<()>,
    config: GossipConfig,
}

impl BroadcastService {
    /// Creates a service with an empty store and no neighbors.
    #[must_use]
    pub fn new(node: Arc<Node>, config: GossipConfig) -> Self {
        Self {
            node,
            store: MessageStore::new(),
            knowledge: NeighborKnowledge::new(),
            topology: TopologyConfig::new(),
            install: Mutex::new(()),
            config,
        }
    }

    /// Returns the node handle.
    #[must_use]
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Returns the id store.
    #[must_use]
    pub const fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Returns the per-neighbor knowledge record.
    #[must_use]
    pub const fn knowledge(&self) -> &NeighborKnowledge {
        &self.knowledge
    }

    /// Returns the installed topology.
    #[must_use]
    pub const fn topology(&self) -> &TopologyConfig {
        &self.topology
    }

    /// Returns the gossip configuration.
    #[must_use]
    pub const fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Accepts a client broadcast. Returns true if the id was new.
    ///
    /// Propagation happens later, on the scheduler's next tick.
    pub fn broadcast(&self, id: MessageId) -> bool {
        let added = self.store.insert(id);
        debug!(node = %self.node.id(), %id, added, "broadcast");
        added
    }

    /// Returns every id this node holds, sorted.
    #[must_use]
    pub fn read(&self) -> Vec<MessageId> {
        self.store.sorted()
    }

    /// Installs this node's neighbors from a coordinator topology.
    ///
    /// All knowledge about previous neighbors is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Topology`] if the topology names a neighbor
    /// that is not a cluster member. The previous topology stays in place.
    pub fn install_topology(&self, topology: &TopologyMap) -> Result<Vec<NodeId>> {
        let neighbors = resolve_neighbors(self.node.id(), self.node.members(), topology)?;
        {
            let _install = self.install.lock();
            self.topology.install(neighbors.clone());
            self.knowledge.reset(&neighbors);
        }
        info!(node = %self.node.id(), neighbors = ?neighbors, "installed topology");
        Ok(neighbors)
    }

    /// Absorbs a gossip push from `from` and returns the reply ids.
    ///
    /// The sender holds everything it sent, so those ids are recorded as known
    /// for it. The reply is what this node still believes the sender lacks,
    /// computed after that update (empty in push-only mode).
    pub fn gossip(&self, from: &NodeId, ids: &[MessageId]) -> Vec<MessageId> {
        let learned = self.store.merge(ids.iter().copied());
        let tracked = self.knowledge.mark_known(from, ids);
        if !learned.is_empty() {
            debug!(node = %self.node.id(), %from, learned = learned.len(), "learned ids from gossip");
        }

        if !self.config.mode.replies_with_delta() {
            return Vec::new();
        }

        let snapshot = self.store.snapshot();
        let mut reply = self.knowledge.delta(from, &snapshot);
        if !tracked {
            let received: HashSet<&MessageId> = ids.iter().collect();
            reply.retain(|id| !received.contains(id));
        }
        reply
    }

    /// Computes the reply to one request.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid topologies and for message types this
    /// node does not serve as requests.
    pub fn respond(&self, src: &NodeId, payload: Payload) -> Result<Payload> {
        match payload {
            Payload::Broadcast { message } => {
                self.broadcast(message);
                Ok(Payload::BroadcastOk)
            }
            Payload::Read => Ok(Payload::ReadOk {
                messages: self.read(),
            }),
            Payload::Topology { topology } => {
                self.install_topology(&topology)?;
                Ok(Payload::TopologyOk)
            }
            Payload::Gossip { ids } => Ok(Payload::GossipOk {
                ids: self.gossip(src, &ids),
            }),
            Payload::Echo { echo } => Ok(Payload::EchoOk { echo }),
            Payload::Init { .. } => Err(BroadcastError::Unsupported(
                "init (node already initialized)".to_string(),
            )),
            other => Err(BroadcastError::Unsupported(other.kind().to_string())),
        }
    }

    /// Handles one inbound request and sends its reply.
    ///
    /// Failures are answered with an `error` body. Requests without a
    /// `msg_id` are applied but never answered, and inbound `error` bodies
    /// are only logged, so two nodes can never bounce errors at each other.
    ///
    /// # Errors
    ///
    /// Returns an error only if the reply could not be handed to the transport.
    pub fn handle(&self, request: Envelope) -> Result<()> {
        let Envelope { src, body, .. } = request;

        if let Payload::Error { code, text } = &body.payload {
            warn!(%src, ?code, %text, "received unsolicited error");
            return Ok(());
        }

        let kind = body.payload.kind();
        let reply = match self.respond(&src, body.payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%src, kind, error = %err, "request failed");
                Payload::error(err.code(), err.to_string())
            }
        };

        match body.msg_id {
            Some(msg_id) => self.node.reply_to(&src, Some(msg_id), reply),
            None => {
                debug!(%src, kind, "request carried no msg_id, not replying");
                Ok(())
            }
        }
    }

    /// Routes an inbound envelope: replies go to the RPC waiting for them,
    /// everything else is handled as a request.
    ///
    /// # Errors
    ///
    /// Returns an error only if a reply could not be handed to the transport.
    pub fn dispatch(&self, envelope: Envelope) -> Result<()> {
        if envelope.is_reply() {
            self.node.complete(envelope);
            return Ok(());
        }
        self.handle(envelope)
    }
}

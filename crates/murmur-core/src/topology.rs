//! This node's direct neighbors, as assigned by the coordinator.

use crate::error::{BroadcastError, Result};
use crate::message::TopologyMap;
use crate::protocol::NodeId;
use parking_lot::RwLock;
use tracing::warn;

/// The installed neighbor list.
///
/// Written by the topology handler, read by the gossip scheduler. Starts
/// empty, so a node that never receives a topology simply gossips with no one.
#[derive(Debug, Default)]
pub struct TopologyConfig {
    neighbors: RwLock<Vec<NodeId>>,
}

impl TopologyConfig {
    /// Creates an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the neighbor list.
    pub fn install(&self, neighbors: Vec<NodeId>) {
        *self.neighbors.write() = neighbors;
    }

    /// Returns a copy of the neighbor list.
    #[must_use]
    pub fn neighbors(&self) -> Vec<NodeId> {
        self.neighbors.read().clone()
    }

    /// Returns true if `node` is a direct neighbor.
    #[must_use]
    pub fn is_neighbor(&self, node: &NodeId) -> bool {
        self.neighbors.read().contains(node)
    }

    /// Returns the number of neighbors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.neighbors.read().len()
    }

    /// Returns true if this node has no neighbors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neighbors.read().is_empty()
    }
}

/// Extracts and validates `me`'s neighbor list from a coordinator topology.
///
/// - A missing entry for `me` yields no neighbors (an isolated node).
/// - `me` listed as its own neighbor is dropped.
/// - Repeated neighbors are collapsed, keeping first-seen order.
/// - A neighbor outside `members` is rejected, unless `members` is empty.
///
/// # Errors
///
/// Returns [`BroadcastError::Topology`] if a neighbor is not a cluster member.
pub fn resolve_neighbors(
    me: &NodeId,
    members: &[NodeId],
    topology: &TopologyMap,
) -> Result<Vec<NodeId>> {
    let Some(listed) = topology.get(me) else {
        warn!(node = %me, "topology has no entry for this node, running isolated");
        return Ok(Vec::new());
    };

    let mut neighbors: Vec<NodeId> = Vec::with_capacity(listed.len());
    for neighbor in listed {
        if neighbor == me {
            warn!(node = %me, "ignoring self-loop in topology");
            continue;
        }
        if !members.is_empty() && !members.contains(neighbor) {
            return Err(BroadcastError::Topology(format!(
                "{neighbor} is not a cluster member"
            )));
        }
        if !neighbors.contains(neighbor) {
            neighbors.push(neighbor.clone());
        }
    }
    Ok(neighbors)
}

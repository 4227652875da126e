//! # murmur-core
//!
//! Eventually-consistent broadcast over a fixed neighbor topology.
//!
//! This crate provides:
//!
//! - The Maelstrom-style message envelope and payload types
//! - A node handle with request/reply correlation and timeouts
//! - An append-only id store and per-neighbor knowledge tracking
//! - A periodic anti-entropy scheduler that sends each neighbor only its delta
//!
//! ## Core Types
//!
//! - [`Envelope`]: One message on the wire
//! - [`Node`]: Identity, transport, and RPC correlation
//! - [`BroadcastService`]: Handlers for broadcast, read, topology and gossip
//! - [`GossipScheduler`]: Drives anti-entropy rounds

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod gossip;
pub mod message;
pub mod node;
pub mod protocol;
pub mod rpc;
pub mod service;
pub mod topology;

pub use error::{BroadcastError, ErrorCode, Result};
pub use gossip::{
    ExchangeOutcome, GossipConfig, GossipMode, GossipRound, GossipScheduler, MessageStore,
    NeighborKnowledge, SchedulerHandle,
};
pub use message::{Body, Envelope, MalformedEnvelope, Payload, TopologyMap};
pub use node::{Node, Transport};
pub use protocol::{MessageId, NodeId};
pub use rpc::{Completion, MsgIdAllocator, PendingRequests};
pub use service::BroadcastService;
pub use topology::{TopologyConfig, resolve_neighbors};

//! Wire messages exchanged between clients and nodes.
//!
//! Every message is a JSON envelope `{"src", "dest", "body"}`. The body's
//! `type` field selects a [`Payload`] variant; correlation ids ride alongside
//! it in [`Body`]. Bodies are decoded exactly once, at the boundary, into the
//! closed [`Payload`] enum.

use crate::error::ErrorCode;
use crate::protocol::{MessageId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Topology as handed out by the coordinator: every node's neighbor list.
pub type TopologyMap = HashMap<NodeId, Vec<NodeId>>;

/// A routed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender.
    pub src: NodeId,
    /// Recipient.
    pub dest: NodeId,
    /// Message body.
    pub body: Body,
}

/// Message body: correlation ids plus a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Sender-assigned id, present on requests that expect a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    /// The `msg_id` of the request this body answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    /// Typed payload, tagged by `type`.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Body {
    /// Creates a body carrying only a payload.
    #[must_use]
    pub const fn new(payload: Payload) -> Self {
        Self {
            msg_id: None,
            in_reply_to: None,
            payload,
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub const fn with_msg_id(mut self, msg_id: u64) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    /// Marks this body as a reply to `msg_id`.
    #[must_use]
    pub const fn in_reply_to(mut self, msg_id: u64) -> Self {
        self.in_reply_to = Some(msg_id);
        self
    }
}

/// Every message type this node understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Handshake from the coordinator.
    Init {
        /// Id assigned to the receiving node.
        node_id: NodeId,
        /// All cluster members, including the receiver.
        node_ids: Vec<NodeId>,
    },
    /// Handshake acknowledgment.
    InitOk,
    /// Echo request.
    Echo {
        /// Arbitrary value to echo back.
        echo: serde_json::Value,
    },
    /// Echo reply.
    EchoOk {
        /// The value from the request.
        echo: serde_json::Value,
    },
    /// Client submits one new id.
    Broadcast {
        /// The broadcast value.
        message: MessageId,
    },
    /// Broadcast acknowledgment.
    BroadcastOk,
    /// Client asks for every id this node holds.
    Read,
    /// Read reply.
    ReadOk {
        /// Every id known to the node.
        messages: Vec<MessageId>,
    },
    /// Coordinator installs the neighbor topology.
    Topology {
        /// Neighbor lists keyed by node.
        topology: TopologyMap,
    },
    /// Topology acknowledgment.
    TopologyOk,
    /// Anti-entropy push from a neighbor.
    Gossip {
        /// Ids the sender believes the receiver lacks.
        ids: Vec<MessageId>,
    },
    /// Anti-entropy reply.
    GossipOk {
        /// Ids the responder believes the requester lacks.
        ids: Vec<MessageId>,
    },
    /// Failure reply.
    Error {
        /// Maelstrom error code.
        code: ErrorCode,
        /// Human-readable description.
        #[serde(default)]
        text: String,
    },
}

impl Payload {
    /// Returns the wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::InitOk => "init_ok",
            Self::Echo { .. } => "echo",
            Self::EchoOk { .. } => "echo_ok",
            Self::Broadcast { .. } => "broadcast",
            Self::BroadcastOk => "broadcast_ok",
            Self::Read => "read",
            Self::ReadOk { .. } => "read_ok",
            Self::Topology { .. } => "topology",
            Self::TopologyOk => "topology_ok",
            Self::Gossip { .. } => "gossip",
            Self::GossipOk { .. } => "gossip_ok",
            Self::Error { .. } => "error",
        }
    }

    /// Builds an error payload.
    #[must_use]
    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Self::Error {
            code,
            text: text.into(),
        }
    }
}

/// A line that could not be decoded into an [`Envelope`].
///
/// Whatever routing information survived is kept so the caller can still
/// answer with an error body.
#[derive(Debug)]
pub struct MalformedEnvelope {
    /// Sender, if the envelope itself parsed.
    pub src: Option<NodeId>,
    /// Recipient, if the envelope itself parsed.
    pub dest: Option<NodeId>,
    /// The request's `msg_id`, if present and numeric.
    pub msg_id: Option<u64>,
    /// What went wrong.
    pub error: serde_json::Error,
}

impl MalformedEnvelope {
    /// Returns the reply target if enough of the request survived to answer it.
    #[must_use]
    pub fn reply_target(&self) -> Option<(&NodeId, u64)> {
        self.src.as_ref().zip(self.msg_id)
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    src: NodeId,
    dest: NodeId,
    body: serde_json::Value,
}

impl Envelope {
    /// Decodes one line of input.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedEnvelope`] if the line is not a valid envelope or the
    /// body does not match any known message type.
    pub fn parse(line: &str) -> Result<Self, MalformedEnvelope> {
        let raw: RawEnvelope = serde_json::from_str(line).map_err(|error| MalformedEnvelope {
            src: None,
            dest: None,
            msg_id: None,
            error,
        })?;

        let msg_id = raw.body.get("msg_id").and_then(serde_json::Value::as_u64);
        match serde_json::from_value::<Body>(raw.body) {
            Ok(body) => Ok(Self {
                src: raw.src,
                dest: raw.dest,
                body,
            }),
            Err(error) => Err(MalformedEnvelope {
                src: Some(raw.src),
                dest: Some(raw.dest),
                msg_id,
                error,
            }),
        }
    }

    /// Encodes the envelope as a single JSON line (without the newline).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns true if this envelope answers an earlier request.
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        self.body.in_reply_to.is_some()
    }
}

//! Error types for murmur-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::NodeId;

/// Maelstrom error codes carried in `error` bodies.
///
/// Only the codes this node can produce or reasonably receive are modelled;
/// anything else decodes as [`ErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ErrorCode {
    /// The request timed out.
    Timeout,
    /// The request type is not supported by this node.
    NotSupported,
    /// The node cannot serve the request right now.
    TemporarilyUnavailable,
    /// The request body could not be decoded.
    MalformedRequest,
    /// The node hit an internal failure.
    Crash,
    /// The operation was aborted.
    Abort,
    /// Any other code.
    Other(u32),
}

impl ErrorCode {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::TemporarilyUnavailable)
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Timeout,
            10 => Self::NotSupported,
            11 => Self::TemporarilyUnavailable,
            12 => Self::MalformedRequest,
            13 => Self::Crash,
            14 => Self::Abort,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Timeout => 0,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
            ErrorCode::Other(other) => other,
        }
    }
}

/// Errors that can occur while serving or propagating broadcasts.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// A message could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The installed topology is invalid for this node.
    #[error("invalid topology: {0}")]
    Topology(String),

    /// A request arrived that this node does not serve.
    #[error("unsupported request type: {0}")]
    Unsupported(String),

    /// A peer answered an RPC with a body of the wrong type.
    #[error("unexpected reply from {peer}: {kind}")]
    UnexpectedReply {
        /// The peer that replied.
        peer: NodeId,
        /// The type tag of the reply.
        kind: String,
    },

    /// A peer answered an RPC with an error body.
    #[error("peer {peer} returned error {code:?}: {text}")]
    Remote {
        /// The peer that replied.
        peer: NodeId,
        /// The error code it returned.
        code: ErrorCode,
        /// Human-readable text from the peer.
        text: String,
    },

    /// An RPC received no reply within its deadline.
    #[error("rpc {msg_id} to {peer} timed out")]
    Timeout {
        /// The peer the request was sent to.
        peer: NodeId,
        /// Correlation id of the request.
        msg_id: u64,
    },

    /// The outbound transport is gone.
    #[error("transport closed")]
    TransportClosed,

    /// A request arrived before the init handshake completed.
    #[error("node not initialized")]
    NotInitialized,
}

impl BroadcastError {
    /// Maps this error onto the Maelstrom error code reported to the caller.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Decode(_) | Self::Topology(_) => ErrorCode::MalformedRequest,
            Self::Unsupported(_) => ErrorCode::NotSupported,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::NotInitialized => ErrorCode::TemporarilyUnavailable,
            Self::Remote { code, .. } => *code,
            Self::UnexpectedReply { .. } | Self::TransportClosed => ErrorCode::Crash,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BroadcastError>;

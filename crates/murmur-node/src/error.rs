//! Error types for murmur-node.

use murmur_core::BroadcastError;
use thiserror::Error;

/// Errors that can occur while configuring or running a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging could not be initialised.
    #[error("logging setup failed: {0}")]
    Logging(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol or transport error from the broadcast core.
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

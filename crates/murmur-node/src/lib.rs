//! murmur-node - Maelstrom broadcast node
//!
//! Runs one member of a broadcast cluster over stdin/stdout: JSON envelopes in,
//! JSON envelopes out, logs on stderr. The protocol logic lives in
//! `murmur_core`; this crate adds the stdio runtime, configuration, and
//! logging setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigOverrides, LogFormat, NodeConfig};
pub use error::NodeError;
pub use runtime::{RunSummary, run};

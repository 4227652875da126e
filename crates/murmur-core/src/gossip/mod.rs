//! Anti-entropy gossip.
//!
//! - [`MessageStore`]: every broadcast id this node has seen
//! - [`NeighborKnowledge`]: per-neighbor lower bound on what each neighbor holds
//! - [`GossipScheduler`]: periodic delta exchange with every neighbor
//! - [`GossipConfig`]: interval, timeout and mode
//!
//! ## Locking
//!
//! The store and the knowledge record have separate locks. Code that needs
//! both takes a store snapshot first and releases the store lock before
//! touching knowledge, so the two are never held together.

mod config;
mod knowledge;
mod scheduler;
mod store;

pub use config::{GossipConfig, GossipMode};
pub use knowledge::NeighborKnowledge;
pub use scheduler::{ExchangeOutcome, GossipRound, GossipScheduler, SchedulerHandle};
pub use store::MessageStore;

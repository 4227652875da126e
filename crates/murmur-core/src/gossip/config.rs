//! Gossip tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which anti-entropy variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GossipMode {
    /// Gossip replies carry the ids the responder believes the requester lacks.
    #[default]
    PushPull,
    /// Gossip replies are always empty; each side relies on its own ticks.
    Push,
}

impl GossipMode {
    /// Returns true if gossip replies piggyback the reverse delta.
    #[must_use]
    pub const fn replies_with_delta(&self) -> bool {
        matches!(self, Self::PushPull)
    }
}

/// Configuration for gossip scheduling and exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipConfig {
    /// Time between scheduler ticks.
    pub interval: Duration,
    /// How long to wait for a gossip reply before giving up until the next tick.
    pub rpc_timeout: Duration,
    /// Anti-entropy variant.
    pub mode: GossipMode,
    /// Upper bound on ids carried by one gossip request. `None` sends the whole delta.
    pub max_ids_per_gossip: Option<usize>,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            rpc_timeout: Duration::from_millis(1000),
            mode: GossipMode::PushPull,
            max_ids_per_gossip: None,
        }
    }
}

impl GossipConfig {
    /// Sets the tick interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the gossip reply timeout.
    #[must_use]
    pub const fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Sets the anti-entropy variant.
    #[must_use]
    pub const fn with_mode(mut self, mode: GossipMode) -> Self {
        self.mode = mode;
        self
    }

    /// Caps the number of ids per gossip request.
    #[must_use]
    pub const fn with_max_ids_per_gossip(mut self, max: usize) -> Self {
        self.max_ids_per_gossip = Some(max);
        self
    }
}

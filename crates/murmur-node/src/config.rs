//! Node configuration.
//!
//! Configuration for a murmur node, including:
//! - Gossip timing and anti-entropy mode
//! - Logging level and output format
//!
//! Values come from an optional TOML file and are then overridden field by
//! field from the command line (or the matching `MURMUR_*` environment
//! variables). With no file and no overrides the defaults apply.

use std::path::Path;
use std::time::Duration;

use murmur_core::{GossipConfig, GossipMode};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::NodeError;

/// Gossip settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GossipSection {
    /// Milliseconds between gossip rounds.
    pub interval_ms: u64,
    /// Milliseconds to wait for a gossip reply.
    pub rpc_timeout_ms: u64,
    /// Anti-entropy variant.
    pub mode: GossipMode,
    /// Optional cap on ids per gossip request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ids_per_gossip: Option<usize>,
}

impl Default for GossipSection {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            rpc_timeout_ms: 1000,
            mode: GossipMode::default(),
            max_ids_per_gossip: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Default level filter. `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Field-level overrides applied on top of the file configuration.
///
/// `None` leaves the file (or default) value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Overrides `gossip.interval_ms`.
    pub interval_ms: Option<u64>,
    /// Overrides `gossip.rpc_timeout_ms`.
    pub rpc_timeout_ms: Option<u64>,
    /// Overrides `gossip.mode`.
    pub mode: Option<GossipMode>,
    /// Overrides `gossip.max_ids_per_gossip`.
    pub max_ids_per_gossip: Option<usize>,
    /// Overrides `logging.level`.
    pub log_level: Option<String>,
    /// Overrides `logging.format`.
    pub log_format: Option<LogFormat>,
}

/// Main node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Gossip configuration.
    pub gossip: GossipSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NodeError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| NodeError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self)
            .map_err(|e| NodeError::Config(format!("failed to serialize config: {e}")))
    }

    /// Apply command-line or environment overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(interval_ms) = overrides.interval_ms {
            self.gossip.interval_ms = interval_ms;
        }
        if let Some(rpc_timeout_ms) = overrides.rpc_timeout_ms {
            self.gossip.rpc_timeout_ms = rpc_timeout_ms;
        }
        if let Some(mode) = overrides.mode {
            self.gossip.mode = mode;
        }
        if let Some(max) = overrides.max_ids_per_gossip {
            self.gossip.max_ids_per_gossip = Some(max);
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level.clone_from(level);
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.gossip.interval_ms == 0 {
            return Err(NodeError::Config(
                "gossip.interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.gossip.rpc_timeout_ms == 0 {
            return Err(NodeError::Config(
                "gossip.rpc_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.gossip.max_ids_per_gossip == Some(0) {
            return Err(NodeError::Config(
                "gossip.max_ids_per_gossip must be greater than 0".to_string(),
            ));
        }

        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            return Err(NodeError::Config(format!(
                "logging.level '{}' is not a valid filter: {e}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Build the core gossip configuration.
    #[must_use]
    pub fn gossip_config(&self) -> GossipConfig {
        let config = GossipConfig::default()
            .with_interval(Duration::from_millis(self.gossip.interval_ms))
            .with_rpc_timeout(Duration::from_millis(self.gossip.rpc_timeout_ms))
            .with_mode(self.gossip.mode);
        match self.gossip.max_ids_per_gossip {
            Some(max) => config.with_max_ids_per_gossip(max),
            None => config,
        }
    }
}

/// Sample configuration written by `murmur-node init-config`.
pub const SAMPLE_CONFIG: &str = r#"# murmur-node configuration

[gossip]
# Milliseconds between anti-entropy rounds.
interval_ms = 200
# Milliseconds to wait for a gossip reply before retrying on a later round.
rpc_timeout_ms = 1000
# "push-pull" replies carry the reverse delta; "push" replies are always empty.
mode = "push-pull"
# Cap on ids per gossip request. Unbounded when omitted.
# max_ids_per_gossip = 512

[logging]
# off, error, warn, info, debug or trace. RUST_LOG takes precedence.
level = "info"
# "pretty" or "json". Logs always go to stderr.
format = "pretty"
"#;

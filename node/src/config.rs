//! Node configuration with TOML file support.

use std::time::Duration;

use itemnet_consensus::Quorum;
use itemnet_network::NetworkTopology;
use itemnet_types::NodeInfo;
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for an item node.
///
/// Load from TOML with [`NodeConfig::from_toml_file`] or build in code
/// (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub resync: ResyncConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Every node in the network, the local one included.
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
}

/// Timing and quorum parameters of item resync.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResyncConfig {
    /// Votes a decision needs. 0 derives it from the network size.
    #[serde(default)]
    pub positive_consensus: usize,

    /// UNDEFINED votes that abandon a resync. 0 derives it from the
    /// network size.
    #[serde(default)]
    pub resync_break_consensus: usize,

    #[serde(default = "default_positive_ratio")]
    pub positive_consensus_ratio: f64,

    #[serde(default = "default_break_ratio")]
    pub resync_break_ratio: f64,

    /// Hard deadline of one resync.
    #[serde(default = "default_max_resync_time_secs")]
    pub max_resync_time_secs: u64,

    /// Poll periods in milliseconds; the last entry repeats.
    #[serde(default = "default_resync_time_ms")]
    pub resync_time_ms: Vec<u64>,

    /// Width of the window used to cluster peer timestamps.
    #[serde(default = "default_max_elections_time_secs")]
    pub max_elections_time_secs: u64,

    /// Bound on each peer query made while committing.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Delay before finalize retries while a commit is running.
    #[serde(default = "default_finalize_retry_ms")]
    pub finalize_retry_ms: u64,
}

/// Node result cache bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_cache_max_age_secs")]
    pub max_age_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}

fn default_positive_ratio() -> f64 {
    0.667
}

fn default_break_ratio() -> f64 {
    0.8
}

fn default_max_resync_time_secs() -> u64 {
    180
}

fn default_resync_time_ms() -> Vec<u64> {
    vec![1000, 2000, 4000]
}

fn default_max_elections_time_secs() -> u64 {
    900
}

fn default_query_timeout_ms() -> u64 {
    5000
}

fn default_finalize_retry_ms() -> u64 {
    1000
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_cache_max_age_secs() -> u64 {
    600
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// When a node list is configured, the transport's topology must name
    /// exactly the same nodes.
    pub fn check_topology(&self, topology: &NetworkTopology) -> Result<(), NodeError> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        if let Some(node) = self
            .nodes
            .iter()
            .find(|n| topology.by_number(n.number) != Some(*n))
        {
            return Err(NodeError::Config(format!(
                "configured node {node} does not match the network topology"
            )));
        }
        if let Some(node) = topology
            .nodes()
            .iter()
            .find(|t| !self.nodes.iter().any(|n| n.number == t.number))
        {
            return Err(NodeError::Config(format!(
                "network node {node} is not configured"
            )));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            resync: ResyncConfig::default(),
            cache: CacheConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl ResyncConfig {
    /// Thresholds for a network of `node_count` nodes. Explicit values win
    /// over ratios.
    pub fn quorum(&self, node_count: usize) -> Result<Quorum, NodeError> {
        let derived = Quorum::from_ratios(
            node_count,
            self.positive_consensus_ratio,
            self.resync_break_ratio,
        )?;
        let pick = |explicit: usize, derived: usize| if explicit > 0 { explicit } else { derived };
        Ok(Quorum::new(
            pick(self.positive_consensus, derived.positive),
            pick(self.resync_break_consensus, derived.resync_break),
        )?)
    }

    pub fn max_resync_time(&self) -> Duration {
        Duration::from_secs(self.max_resync_time_secs)
    }

    /// Delay before poll number `attempt` (0-based).
    pub fn poll_period(&self, attempt: usize) -> Duration {
        let ms = self
            .resync_time_ms
            .get(attempt)
            .or_else(|| self.resync_time_ms.last())
            .copied()
            .unwrap_or(1000);
        Duration::from_millis(ms.max(1))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn finalize_retry(&self) -> Duration {
        Duration::from_millis(self.finalize_retry_ms.max(1))
    }
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            positive_consensus: 0,
            resync_break_consensus: 0,
            positive_consensus_ratio: default_positive_ratio(),
            resync_break_ratio: default_break_ratio(),
            max_resync_time_secs: default_max_resync_time_secs(),
            resync_time_ms: default_resync_time_ms(),
            max_elections_time_secs: default_max_elections_time_secs(),
            query_timeout_ms: default_query_timeout_ms(),
            finalize_retry_ms: default_finalize_retry_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            max_age_secs: default_cache_max_age_secs(),
        }
    }
}

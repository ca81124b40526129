//! Configuration for shardcoord components

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `SHARDCOORD__COORDINATOR__BIND_ADDR`.
pub const ENV_PREFIX: &str = "SHARDCOORD";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID (unique identifier)
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Coordinator-specific config
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Worker-specific config
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_node_id() -> String {
    "coord-1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            coordinator: CoordinatorConfig::default(),
            worker: WorkerConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then `SHARDCOORD__*` environment
    /// variables. Missing keys fall back to defaults.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(crate::Error::InvalidConfig("node_id cannot be empty".into()));
        }
        self.coordinator.validate()
    }
}

/// A worker node the coordinator dispatches shard operations to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub id: String,
    /// Base URL of the worker HTTP API, e.g. `http://10.0.0.7:7000`
    pub address: String,
}

impl std::str::FromStr for NodeEndpoint {
    type Err = crate::Error;

    /// Parses `id=address`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((id, address)) if !id.is_empty() && !address.is_empty() => Ok(Self {
                id: id.trim().to_string(),
                address: address.trim().to_string(),
            }),
            _ => Err(crate::Error::InvalidConfig(format!(
                "node must be written as id=address, got {:?}",
                s
            ))),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for HTTP API
    #[serde(default = "default_coord_bind")]
    pub bind_addr: SocketAddr,

    /// Worker nodes. When empty the coordinator runs standalone with an
    /// in-process shard.
    #[serde(default)]
    pub nodes: Vec<NodeEndpoint>,

    /// Full replicas placed per collection
    #[serde(default = "default_replicas")]
    pub replicas_per_collection: usize,

    /// Upper bound on a single shard call
    #[serde(default = "default_shard_timeout")]
    pub shard_timeout_ms: u64,

    /// Node telemetry refresh interval
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub placement: PlacementConfig,
}

fn default_coord_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5500))
}
fn default_replicas() -> usize {
    1
}
fn default_shard_timeout() -> u64 {
    5_000
}
fn default_telemetry_interval() -> u64 {
    10
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_coord_bind(),
            nodes: Vec::new(),
            replicas_per_collection: default_replicas(),
            shard_timeout_ms: default_shard_timeout(),
            telemetry_interval_secs: default_telemetry_interval(),
            retry: RetryConfig::default(),
            placement: PlacementConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn shard_timeout(&self) -> Duration {
        Duration::from_millis(self.shard_timeout_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry_interval_secs.max(1))
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.replicas_per_collection == 0 {
            return Err(crate::Error::InvalidConfig(
                "replicas_per_collection must be at least 1".into(),
            ));
        }
        if self.shard_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "shard_timeout_ms must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(crate::Error::InvalidConfig(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }
        Ok(())
    }
}

/// Backoff for idempotent shard calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> usize {
    3
}
fn default_initial_backoff() -> u64 {
    50
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

/// Capacity rules used when choosing nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Headroom a node must keep beyond the collection footprint
    #[serde(default = "default_safety_margin")]
    pub safety_margin_bytes: u64,

    /// Footprint assumed when the collection size is not known yet
    #[serde(default = "default_min_reservation")]
    pub min_reservation_bytes: u64,

    /// Snapshots older than this are ignored
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_secs: u64,
}

fn default_safety_margin() -> u64 {
    256 * 1024 * 1024
}
fn default_min_reservation() -> u64 {
    64 * 1024 * 1024
}
fn default_snapshot_ttl() -> u64 {
    30
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            safety_margin_bytes: default_safety_margin(),
            min_reservation_bytes: default_min_reservation(),
            snapshot_ttl_secs: default_snapshot_ttl(),
        }
    }
}

impl PlacementConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Bind address for the worker HTTP API
    #[serde(default = "default_worker_bind")]
    pub bind_addr: SocketAddr,

    /// Disk capacity advertised for the stable_disk tier
    #[serde(default = "default_disk_capacity")]
    pub disk_capacity_bytes: u64,
}

fn default_worker_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7000))
}
fn default_disk_capacity() -> u64 {
    64 * 1024 * 1024 * 1024
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_worker_bind(),
            disk_capacity_bytes: default_disk_capacity(),
        }
    }
}

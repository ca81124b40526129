//! Common utilities and types shared across shardcoord

pub mod config;
pub mod error;
pub mod telemetry;
pub mod tracing_middleware;
pub mod utils;
pub mod wire;

pub use config::{
    Config, CoordinatorConfig, NodeEndpoint, PlacementConfig, RetryConfig, WorkerConfig,
};
pub use error::{Error, ErrorCode, Result, ShardError};
pub use telemetry::{ResourceSampler, ResourceSnapshot};
pub use utils::{encode_name, format_bytes, timestamp_now_millis, validate_name, NodeState};

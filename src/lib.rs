//! # shardcoord
//!
//! A resource coordinator for a sharded vector-search cluster:
//! - Collection lifecycle (create, load, release, delete) across worker nodes
//! - Resource-aware placement from live CPU and memory telemetry
//! - Concurrent shard fan-out with per-call timeouts and partial-failure reporting
//! - Per-collection operation serialization
//! - HTTP/JSON for the public API and for coordinator-to-worker calls
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Coordinator                │
//! │  registry · lifecycle · placement       │
//! │  node directory (telemetry refresh)     │
//! └───────────┬─────────────────────────────┘
//!             │ HTTP/JSON
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌──▼───────────┐
//! │ Worker 1   │   │ Worker 2   │   │ Worker 3     │
//! │ (shards)   │   │ (shards)   │   │ (shards)     │
//! └────────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a worker
//! ```bash
//! shardcoord-worker serve --id node-a --bind 0.0.0.0:7000
//! ```
//!
//! ### Start a coordinator
//! ```bash
//! shardcoord serve \
//!   --id coord-1 \
//!   --bind 0.0.0.0:5500 \
//!   --node node-a=http://10.0.0.1:7000 \
//!   --node node-b=http://10.0.0.2:7000 \
//!   --replicas 2
//! ```
//!
//! Without any `--node` the coordinator runs standalone with an in-process
//! shard.
//!
//! ### Manage collections
//! ```bash
//! curl -X POST localhost:5500/collections -H 'content-type: application/json' \
//!   -d '{"collection_name":"docs","dim":128,"distance":"Cosine","quantization":"F32",
//!        "connectivity":16,"expansion_add":128,"expansion_search":64,
//!        "storage":"highspeed_memory"}'
//! curl -X POST localhost:5500/collections/docs/load
//! curl 'localhost:5500/collections/docs?with_size=true'
//! ```

pub mod common;
pub mod coordinator;
pub mod shard;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use shard::WorkerServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

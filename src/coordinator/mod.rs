//! Coordinator: collection lifecycle over a set of worker nodes
//!
//! The coordinator is responsible for:
//! - The collection registry (name → definition, status, placements)
//! - Placement decisions from live node telemetry
//! - Driving create/load/release/delete across shards
//! - Health monitoring of worker nodes
//! - The public HTTP API

pub mod http;
pub mod lifecycle;
pub mod model;
pub mod nodes;
pub mod placement;
pub mod registry;
pub mod server;
pub mod service;
pub mod shard_client;

pub use lifecycle::{CollectionView, DispatchOutcome, LifecycleCoordinator, ReleaseReport};
pub use server::Coordinator;
pub use service::CoordinatorService;

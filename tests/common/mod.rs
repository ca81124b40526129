//! Shared test fixtures: a fault-injecting in-memory shard and builders
//! for a coordinator wired to it.

#![allow(dead_code)]

use async_trait::async_trait;
use shardcoord::common::config::{PlacementConfig, RetryConfig};
use shardcoord::common::{ResourceSnapshot, ShardError};
use shardcoord::coordinator::model::{CollectionDefinition, Distance, Quantization, StorageType};
use shardcoord::coordinator::nodes::NodeDirectory;
use shardcoord::coordinator::placement::PlacementPolicy;
use shardcoord::coordinator::registry::CollectionRegistry;
use shardcoord::coordinator::shard_client::{NodeResources, ShardClient, ShardInfo};
use shardcoord::coordinator::{CoordinatorService, LifecycleCoordinator};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const GIB: u64 = 1024 * 1024 * 1024;
pub const MIB: u64 = 1024 * 1024;
pub const SHARD_TIMEOUT: Duration = Duration::from_millis(200);

/// Collection operations, as opposed to telemetry calls
pub const COLLECTION_OPS: &[&str] = &["create", "delete", "load", "release", "info"];

/// In-memory shard with call counters and injectable failures, delays and
/// panics per operation.
pub struct FakeShard {
    node_id: String,
    collections: Mutex<HashMap<String, ShardInfo>>,
    calls: Mutex<HashMap<String, usize>>,
    failures: Mutex<HashMap<String, ShardError>>,
    delays: Mutex<HashMap<String, Duration>>,
    panics: Mutex<HashSet<String>>,
    resources: Mutex<NodeResources>,
}

impl FakeShard {
    pub fn new(node_id: &str) -> Arc<Self> {
        Arc::new(Self {
            node_id: node_id.to_string(),
            collections: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            panics: Mutex::new(HashSet::new()),
            resources: Mutex::new(NodeResources {
                snapshot: ResourceSnapshot::from_memory(
                    3_600,
                    (0.5, 0.5, 0.5),
                    64 * GIB,
                    32 * GIB,
                    32 * GIB,
                    16 * GIB,
                ),
                disk_available: 512 * GIB,
            }),
        })
    }

    pub fn fail(&self, op: &str, error: ShardError) {
        self.failures.lock().unwrap().insert(op.to_string(), error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn delay(&self, op: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(op.to_string(), delay);
    }

    pub fn panic_on(&self, op: &str) {
        self.panics.lock().unwrap().insert(op.to_string());
    }

    pub fn clear_panics(&self) {
        self.panics.lock().unwrap().clear();
    }

    pub fn set_load(&self, load1: f64) {
        self.resources.lock().unwrap().snapshot.cpu_load1 = load1;
    }

    pub fn set_mem_available(&self, bytes: u64) {
        self.resources.lock().unwrap().snapshot.mem_available = bytes;
    }

    pub fn set_size(&self, name: &str, size: u64) {
        if let Some(info) = self.collections.lock().unwrap().get_mut(name) {
            info.size = size;
        }
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.lock().unwrap().contains_key(name)
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn collection_calls(&self) -> usize {
        COLLECTION_OPS.iter().map(|op| self.calls(op)).sum()
    }

    pub fn unreachable(&self) -> ShardError {
        ShardError::Unreachable {
            node: self.node_id.clone(),
            reason: "connection refused".into(),
        }
    }

    pub fn rejected(&self, reason: &str) -> ShardError {
        ShardError::Rejected {
            node: self.node_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn internal(&self, reason: &str) -> ShardError {
        ShardError::Internal {
            node: self.node_id.clone(),
            reason: reason.into(),
        }
    }

    fn not_found(&self, name: &str) -> ShardError {
        ShardError::NotFound {
            node: self.node_id.clone(),
            collection: name.to_string(),
        }
    }

    async fn enter(&self, op: &str) -> Result<(), ShardError> {
        *self.calls.lock().unwrap().entry(op.to_string()).or_insert(0) += 1;

        let delay = self.delays.lock().unwrap().get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let panics = self.panics.lock().unwrap().contains(op);
        if panics {
            panic!("injected panic in {}", op);
        }

        let failure = self.failures.lock().unwrap().get(op).cloned();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ShardClient for FakeShard {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn create(&self, definition: &CollectionDefinition) -> Result<ShardInfo, ShardError> {
        self.enter("create").await?;
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(&definition.name) {
            return Err(self.rejected("already exists"));
        }
        let info = ShardInfo::default();
        collections.insert(definition.name.clone(), info.clone());
        Ok(info)
    }

    async fn delete(&self, name: &str) -> Result<(), ShardError> {
        self.enter("delete").await?;
        match self.collections.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(self.not_found(name)),
        }
    }

    async fn load(&self, name: &str) -> Result<ShardInfo, ShardError> {
        self.enter("load").await?;
        let mut collections = self.collections.lock().unwrap();
        let info = collections
            .get_mut(name)
            .ok_or_else(|| self.not_found(name))?;
        info.loaded = true;
        info.memory = info.size * 512;
        Ok(info.clone())
    }

    async fn release(&self, name: &str) -> Result<(), ShardError> {
        self.enter("release").await?;
        let mut collections = self.collections.lock().unwrap();
        let info = collections
            .get_mut(name)
            .ok_or_else(|| self.not_found(name))?;
        info.loaded = false;
        info.memory = 0;
        Ok(())
    }

    async fn info(&self, name: &str) -> Result<ShardInfo, ShardError> {
        self.enter("info").await?;
        self.collections
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    async fn ping(&self) -> Result<(), ShardError> {
        self.enter("ping").await
    }

    async fn resources(&self) -> Result<NodeResources, ShardError> {
        self.enter("resources").await?;
        let mut resources = self.resources.lock().unwrap().clone();
        resources.snapshot.sampled_at_ms = shardcoord::common::timestamp_now_millis();
        Ok(resources)
    }
}

pub fn placement_config() -> PlacementConfig {
    PlacementConfig {
        safety_margin_bytes: 256 * MIB,
        min_reservation_bytes: 64 * MIB,
        snapshot_ttl_secs: 30,
    }
}

pub fn retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_backoff_ms: 1,
    }
}

pub fn lifecycle(shards: &[Arc<FakeShard>], replicas: usize) -> Arc<LifecycleCoordinator> {
    let nodes = Arc::new(NodeDirectory::new(SHARD_TIMEOUT, retry_config()));
    for shard in shards {
        nodes.register(shard.clone());
    }
    Arc::new(LifecycleCoordinator::new(
        Arc::new(CollectionRegistry::new()),
        nodes,
        PlacementPolicy::new(placement_config(), replicas),
        SHARD_TIMEOUT,
        retry_config(),
    ))
}

pub fn service(shards: &[Arc<FakeShard>], replicas: usize) -> CoordinatorService {
    CoordinatorService::new(lifecycle(shards, replicas))
}

pub fn docs() -> CollectionDefinition {
    CollectionDefinition::new("docs", 128, Distance::Cosine)
        .with_quantization(Quantization::F32)
        .with_storage(StorageType::HighspeedMemory)
}

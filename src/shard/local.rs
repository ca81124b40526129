//! In-process shard backend
//!
//! Keeps collection definitions and their loaded flag in memory. The vector
//! index itself lives behind this bookkeeping and is not modelled here:
//! sizes only change through `set_size`, and the memory figure of a loaded
//! replica is the footprint estimate for its current size.

use crate::common::error::ShardError;
use crate::common::telemetry::ResourceSampler;
use crate::coordinator::model::{CollectionDefinition, StorageType};
use crate::coordinator::shard_client::{NodeResources, ShardClient, ShardInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone)]
struct LocalCollection {
    definition: CollectionDefinition,
    loaded: bool,
    size: u64,
}

impl LocalCollection {
    fn info(&self) -> ShardInfo {
        ShardInfo {
            size: self.size,
            memory: if self.loaded {
                self.definition.estimated_footprint(self.size)
            } else {
                0
            },
            loaded: self.loaded,
        }
    }
}

/// Shard state held by a worker process
pub struct LocalShard {
    node_id: String,
    collections: RwLock<HashMap<String, LocalCollection>>,
    sampler: ResourceSampler,
    disk_capacity: u64,
}

impl LocalShard {
    pub fn new(node_id: impl Into<String>, disk_capacity: u64) -> Self {
        Self {
            node_id: node_id.into(),
            collections: RwLock::new(HashMap::new()),
            sampler: ResourceSampler::new(),
            disk_capacity,
        }
    }

    fn not_found(&self, name: &str) -> ShardError {
        ShardError::NotFound {
            node: self.node_id.clone(),
            collection: name.to_string(),
        }
    }

    /// Records the element count reported by the index engine.
    pub fn set_size(&self, name: &str, size: u64) -> Result<(), ShardError> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| self.not_found(name))?;
        collection.size = size;
        Ok(())
    }

    pub fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        names
    }

    fn disk_used(&self) -> u64 {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        collections
            .values()
            .filter(|c| c.definition.storage == StorageType::StableDisk)
            .map(|c| c.definition.estimated_footprint(c.size))
            .sum()
    }
}

#[async_trait]
impl ShardClient for LocalShard {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn create(&self, definition: &CollectionDefinition) -> Result<ShardInfo, ShardError> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        if collections.contains_key(&definition.name) {
            return Err(ShardError::Rejected {
                node: self.node_id.clone(),
                reason: format!("collection {} already exists", definition.name),
            });
        }
        let collection = LocalCollection {
            definition: definition.clone(),
            loaded: false,
            size: 0,
        };
        let info = collection.info();
        collections.insert(definition.name.clone(), collection);
        tracing::debug!(node = %self.node_id, collection = %definition.name, "Shard created");
        Ok(info)
    }

    async fn delete(&self, name: &str) -> Result<(), ShardError> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        match collections.remove(name) {
            Some(_) => Ok(()),
            None => Err(self.not_found(name)),
        }
    }

    async fn load(&self, name: &str) -> Result<ShardInfo, ShardError> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| self.not_found(name))?;
        collection.loaded = true;
        Ok(collection.info())
    }

    async fn release(&self, name: &str) -> Result<(), ShardError> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| self.not_found(name))?;
        collection.loaded = false;
        Ok(())
    }

    async fn info(&self, name: &str) -> Result<ShardInfo, ShardError> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        collections
            .get(name)
            .map(LocalCollection::info)
            .ok_or_else(|| self.not_found(name))
    }

    async fn ping(&self) -> Result<(), ShardError> {
        Ok(())
    }

    async fn resources(&self) -> Result<NodeResources, ShardError> {
        Ok(NodeResources {
            snapshot: self.sampler.sample(),
            disk_available: self.disk_capacity.saturating_sub(self.disk_used()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::model::{Distance, Quantization};

    fn docs() -> CollectionDefinition {
        CollectionDefinition::new("docs", 128, Distance::Cosine)
            .with_quantization(Quantization::F32)
    }

    #[tokio::test]
    async fn test_create_load_release_delete() {
        let shard = LocalShard::new("local", 1 << 30);
        let info = shard.create(&docs()).await.unwrap();
        assert!(!info.loaded);

        shard.set_size("docs", 1_000).unwrap();
        let info = shard.load("docs").await.unwrap();
        assert!(info.loaded);
        assert_eq!(info.size, 1_000);
        assert_eq!(info.memory, 128 * 4 * 1_000);

        // Loading twice is harmless
        assert!(shard.load("docs").await.unwrap().loaded);

        shard.release("docs").await.unwrap();
        assert_eq!(shard.info("docs").await.unwrap().memory, 0);

        shard.delete("docs").await.unwrap();
        assert!(matches!(
            shard.delete("docs").await,
            Err(ShardError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let shard = LocalShard::new("local", 1 << 30);
        shard.create(&docs()).await.unwrap();
        let err = shard.create(&docs()).await.unwrap_err();
        assert!(matches!(err, ShardError::Rejected { .. }));
        assert_eq!(shard.collection_names(), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn test_disk_available_accounts_for_disk_collections() {
        let shard = LocalShard::new("local", 1_000_000);
        let def = CollectionDefinition::new("archive", 100, Distance::L2sq)
            .with_quantization(Quantization::I8)
            .with_storage(StorageType::StableDisk);
        shard.create(&def).await.unwrap();
        shard.set_size("archive", 1_000).unwrap();

        let resources = shard.resources().await.unwrap();
        assert_eq!(resources.disk_available, 1_000_000 - 100_000);
    }
}

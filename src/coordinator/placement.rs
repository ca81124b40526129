//! Resource-aware placement of collection replicas
//!
//! A node qualifies for a collection when it is healthy, its snapshot is
//! fresh, and the headroom of the collection's storage tier (memory for
//! `highspeed_memory`, disk for `stable_disk`) strictly exceeds the
//! reservation plus the configured safety margin. Qualifying nodes are
//! ranked by ascending 1-minute load average, ties broken by node id.

use crate::common::config::PlacementConfig;
use crate::common::utils::timestamp_now_millis;
use crate::common::{Error, Result};
use crate::coordinator::model::{CollectionDefinition, StorageType};
use crate::coordinator::nodes::NodeSnapshot;

/// PlacementPolicy picks the nodes that host a collection's replicas.
#[derive(Debug, Clone)]
pub struct PlacementPolicy {
    config: PlacementConfig,
    /// Full replicas per collection
    replicas: usize,
}

impl PlacementPolicy {
    pub fn new(config: PlacementConfig, replicas: usize) -> Self {
        Self {
            config,
            replicas: replicas.max(1),
        }
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Bytes a node must have free beyond the safety margin. An unknown or
    /// zero expected size only checks the minimum reservation.
    pub fn required_bytes(
        &self,
        definition: &CollectionDefinition,
        expected_size: Option<u64>,
    ) -> u64 {
        let estimate = match expected_size {
            Some(size) if size > 0 => definition.estimated_footprint(size),
            _ => 0,
        };
        estimate.max(self.config.min_reservation_bytes)
    }

    /// Headroom of `tier` on the node, if it ever reported resources.
    pub fn available_for(tier: StorageType, snapshot: &NodeSnapshot) -> Option<u64> {
        let resources = snapshot.resources.as_ref()?;
        match tier {
            StorageType::HighspeedMemory => Some(resources.snapshot.mem_available),
            StorageType::StableDisk => Some(resources.disk_available),
            StorageType::Unknown => None,
        }
    }

    fn is_eligible(
        &self,
        tier: StorageType,
        required: u64,
        snapshot: &NodeSnapshot,
        now_ms: u64,
    ) -> bool {
        if !snapshot.is_fresh(now_ms, self.config.snapshot_ttl()) {
            return false;
        }
        match Self::available_for(tier, snapshot) {
            Some(available) => available > required.saturating_add(self.config.safety_margin_bytes),
            None => false,
        }
    }

    /// Chooses `replicas` distinct nodes for a new collection.
    pub fn select_nodes(
        &self,
        definition: &CollectionDefinition,
        expected_size: Option<u64>,
        snapshots: &[NodeSnapshot],
    ) -> Result<Vec<String>> {
        let required = self.required_bytes(definition, expected_size);
        let now = timestamp_now_millis();

        let mut eligible: Vec<&NodeSnapshot> = snapshots
            .iter()
            .filter(|s| self.is_eligible(definition.storage, required, s, now))
            .collect();

        if eligible.len() < self.replicas {
            return Err(Error::NoCapacity {
                tier: definition.storage.to_string(),
                needed_bytes: required,
                candidates: eligible.len(),
            });
        }

        eligible.sort_by(|a, b| {
            load1(a)
                .total_cmp(&load1(b))
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        Ok(eligible
            .into_iter()
            .take(self.replicas)
            .map(|s| s.node_id.clone())
            .collect())
    }

    /// Re-checks headroom on already placed nodes before a load.
    pub fn validate_nodes(
        &self,
        definition: &CollectionDefinition,
        expected_size: Option<u64>,
        nodes: &[String],
        snapshots: &[NodeSnapshot],
    ) -> Result<()> {
        let required = self.required_bytes(definition, expected_size);
        let now = timestamp_now_millis();

        let lacking = nodes
            .iter()
            .filter(|id| {
                !snapshots
                    .iter()
                    .find(|s| &s.node_id == *id)
                    .is_some_and(|s| self.is_eligible(definition.storage, required, s, now))
            })
            .count();

        if lacking > 0 {
            return Err(Error::NoCapacity {
                tier: definition.storage.to_string(),
                needed_bytes: required,
                candidates: nodes.len() - lacking,
            });
        }
        Ok(())
    }
}

fn load1(snapshot: &NodeSnapshot) -> f64 {
    snapshot
        .resources
        .as_ref()
        .map(|r| r.snapshot.cpu_load1)
        .unwrap_or(f64::MAX)
}

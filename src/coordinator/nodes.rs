//! Node directory: known workers and their latest telemetry
//!
//! Snapshots are replaced wholesale on every refresh and handed out as
//! clones, so placement reads never contend with collection operations.

use crate::common::config::RetryConfig;
use crate::common::utils::{retry_with_backoff, timestamp_now_millis};
use crate::common::{Error, NodeState, Result};
use crate::coordinator::shard_client::{call_with_timeout, NodeResources, ShardClient};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Consecutive failed refreshes before a node is declared dead
const DEAD_AFTER_FAILURES: u32 = 3;

/// Latest observation of one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub state: NodeState,
    /// Last successful resource report, if any
    pub resources: Option<NodeResources>,
    /// Local time of the last successful report (Unix ms)
    pub observed_at_ms: u64,
}

impl NodeSnapshot {
    /// Healthy and observed within `ttl` of `now_ms`.
    pub fn is_fresh(&self, now_ms: u64, ttl: Duration) -> bool {
        self.state.is_healthy()
            && self.resources.is_some()
            && now_ms.saturating_sub(self.observed_at_ms) <= ttl.as_millis() as u64
    }
}

struct NodeEntry {
    client: Arc<dyn ShardClient>,
    state: NodeState,
    failures: u32,
    resources: Option<NodeResources>,
    observed_at_ms: u64,
}

pub struct NodeDirectory {
    nodes: RwLock<BTreeMap<String, NodeEntry>>,
    call_timeout: Duration,
    retry: RetryConfig,
}

impl NodeDirectory {
    pub fn new(call_timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            call_timeout,
            retry,
        }
    }

    /// Adds a node. It has no snapshot until the first refresh.
    pub fn register(&self, client: Arc<dyn ShardClient>) {
        let node_id = client.node_id().to_string();
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.insert(
            node_id,
            NodeEntry {
                client,
                state: NodeState::Alive,
                failures: 0,
                resources: None,
                observed_at_ms: 0,
            },
        );
    }

    pub fn client(&self, node_id: &str) -> Result<Arc<dyn ShardClient>> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .get(node_id)
            .map(|e| e.client.clone())
            .ok_or_else(|| Error::UnknownNode(node_id.to_string()))
    }

    pub fn node_ids(&self) -> Vec<String> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of every node's latest observation, by node id.
    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .iter()
            .map(|(id, e)| NodeSnapshot {
                node_id: id.clone(),
                state: e.state,
                resources: e.resources.clone(),
                observed_at_ms: e.observed_at_ms,
            })
            .collect()
    }

    /// Pulls resources from every node concurrently.
    pub async fn refresh(&self) {
        let clients: Vec<Arc<dyn ShardClient>> = {
            let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
            nodes.values().map(|e| e.client.clone()).collect()
        };

        let calls = clients.into_iter().map(|client| async move {
            let node_id = client.node_id().to_string();
            let result = retry_with_backoff(
                || call_with_timeout(&node_id, self.call_timeout, client.resources()),
                self.retry.max_attempts,
                self.retry.initial_backoff(),
            )
            .await;
            (node_id, result)
        });
        let results = join_all(calls).await;

        let now = timestamp_now_millis();
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        for (node_id, result) in results {
            let Some(entry) = nodes.get_mut(&node_id) else {
                continue;
            };
            match result {
                Ok(resources) => {
                    if entry.state != NodeState::Alive {
                        tracing::info!(node = %node_id, "Node is back");
                    }
                    entry.state = NodeState::Alive;
                    entry.failures = 0;
                    entry.resources = Some(resources);
                    entry.observed_at_ms = now;
                }
                Err(e) => {
                    entry.failures += 1;
                    entry.state = if entry.failures >= DEAD_AFTER_FAILURES {
                        NodeState::Dead
                    } else {
                        NodeState::Suspect
                    };
                    tracing::warn!(
                        node = %node_id,
                        failures = entry.failures,
                        state = %entry.state,
                        "Telemetry refresh failed: {}",
                        e
                    );
                }
            }
        }
    }

    /// Background refresh on a fixed interval.
    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.refresh().await;
                tracing::debug!(nodes = self.len(), "Telemetry refreshed");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::LocalShard;

    fn directory() -> NodeDirectory {
        NodeDirectory::new(
            Duration::from_secs(1),
            RetryConfig {
                max_attempts: 1,
                initial_backoff_ms: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_refresh_records_snapshot() {
        let nodes = directory();
        nodes.register(Arc::new(LocalShard::new("node-a", 1 << 30)));
        assert!(nodes.snapshots()[0].resources.is_none());

        nodes.refresh().await;
        let snapshots = nodes.snapshots();
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.state, NodeState::Alive);
        assert_eq!(snapshot.resources.as_ref().unwrap().disk_available, 1 << 30);
        assert!(snapshot.is_fresh(timestamp_now_millis(), Duration::from_secs(30)));
    }

    #[test]
    fn test_unknown_node() {
        let nodes = directory();
        assert!(matches!(nodes.client("ghost"), Err(Error::UnknownNode(_))));
    }

    #[test]
    fn test_stale_snapshot_not_fresh() {
        let snapshot = NodeSnapshot {
            node_id: "node-a".into(),
            state: NodeState::Alive,
            resources: None,
            observed_at_ms: 1_000,
        };
        assert!(!snapshot.is_fresh(1_500, Duration::from_secs(30)));
    }
}

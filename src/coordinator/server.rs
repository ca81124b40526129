//! Coordinator server

use crate::common::{CoordinatorConfig, Result};
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::lifecycle::LifecycleCoordinator;
use crate::coordinator::nodes::NodeDirectory;
use crate::coordinator::placement::PlacementPolicy;
use crate::coordinator::registry::CollectionRegistry;
use crate::coordinator::service::CoordinatorService;
use crate::coordinator::shard_client::{HttpShardClient, ShardClient};
use crate::shard::LocalShard;
use std::sync::Arc;

/// Node id of the in-process shard used when no workers are configured
pub const STANDALONE_NODE_ID: &str = "local";

pub struct Coordinator {
    config: CoordinatorConfig,
    node_id: String,
    /// Disk capacity advertised by the standalone shard
    standalone_disk_capacity: u64,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, node_id: String) -> Self {
        Self {
            config,
            node_id,
            standalone_disk_capacity: crate::common::WorkerConfig::default().disk_capacity_bytes,
        }
    }

    pub fn with_standalone_disk_capacity(mut self, bytes: u64) -> Self {
        self.standalone_disk_capacity = bytes;
        self
    }

    /// Wires registry, nodes, placement and lifecycle into a service.
    pub fn build_service(&self) -> Result<Arc<CoordinatorService>> {
        let nodes = Arc::new(NodeDirectory::new(
            self.config.shard_timeout(),
            self.config.retry.clone(),
        ));

        if self.config.nodes.is_empty() {
            tracing::info!("  No worker nodes configured, running standalone");
            nodes.register(Arc::new(LocalShard::new(
                STANDALONE_NODE_ID,
                self.standalone_disk_capacity,
            )));
        }
        for endpoint in &self.config.nodes {
            let client: Arc<dyn ShardClient> = Arc::new(HttpShardClient::new(
                endpoint.id.clone(),
                endpoint.address.clone(),
                self.config.shard_timeout(),
            )?);
            nodes.register(client);
            tracing::info!("  Worker {}: {}", endpoint.id, endpoint.address);
        }

        // A standalone coordinator has a single node to place on.
        let replicas = if self.config.nodes.is_empty() {
            1
        } else {
            self.config.replicas_per_collection
        };

        let lifecycle = Arc::new(LifecycleCoordinator::new(
            Arc::new(CollectionRegistry::new()),
            nodes,
            PlacementPolicy::new(self.config.placement.clone(), replicas),
            self.config.shard_timeout(),
            self.config.retry.clone(),
        ));
        Ok(Arc::new(CoordinatorService::new(lifecycle)))
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting coordinator: {}", self.node_id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Replicas: {}", self.config.replicas_per_collection);
        tracing::info!("  Shard timeout: {:?}", self.config.shard_timeout());

        let service = self.build_service()?;

        let refresh_handle = service
            .lifecycle()
            .nodes()
            .clone()
            .spawn_refresh_loop(self.config.telemetry_interval());

        let router = create_router(CoordState { service });
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Coordinator ready");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(crate::common::utils::shutdown_signal())
            .await;
        refresh_handle.abort();
        served?;

        tracing::info!("Coordinator stopped");
        Ok(())
    }
}

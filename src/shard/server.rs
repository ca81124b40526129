//! Worker server

use crate::common::{Result, WorkerConfig};
use crate::shard::http::{create_router, WorkerState};
use crate::shard::local::LocalShard;
use std::sync::Arc;

pub struct WorkerServer {
    config: WorkerConfig,
    node_id: String,
}

impl WorkerServer {
    pub fn new(config: WorkerConfig, node_id: String) -> Self {
        Self { config, node_id }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting worker: {}", self.node_id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!(
            "  Disk capacity: {}",
            crate::common::format_bytes(self.config.disk_capacity_bytes)
        );

        let shard = Arc::new(LocalShard::new(
            self.node_id.clone(),
            self.config.disk_capacity_bytes,
        ));
        let router = create_router(WorkerState { shard });

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Worker ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(crate::common::utils::shutdown_signal())
            .await?;

        tracing::info!("Worker stopped");
        Ok(())
    }
}

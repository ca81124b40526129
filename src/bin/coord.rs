//! Coordinator binary

use clap::{Parser, Subcommand};
use shardcoord::common::{Config, NodeEndpoint};
use shardcoord::Coordinator;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardcoord")]
#[command(about = "shardcoord resource coordinator for sharded vector collections")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Node ID
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Worker node as `id=http://host:port` (repeatable). Without any
        /// the coordinator runs standalone.
        #[arg(long = "node")]
        nodes: Vec<NodeEndpoint>,

        /// Full replicas per collection
        #[arg(long)]
        replicas: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            id,
            bind,
            nodes,
            replicas,
        } => {
            // File and environment first, CLI flags win
            let mut config = Config::load(config.as_deref())?;
            if let Some(id) = id {
                config.node_id = id;
            }
            if let Some(bind) = bind {
                config.coordinator.bind_addr = bind;
            }
            if !nodes.is_empty() {
                config.coordinator.nodes = nodes;
            }
            if let Some(replicas) = replicas {
                config.coordinator.replicas_per_collection = replicas;
            }
            config.validate()?;

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let coord = Coordinator::new(config.coordinator, config.node_id)
                .with_standalone_disk_capacity(config.worker.disk_capacity_bytes);
            coord.serve().await?;
        }
    }

    Ok(())
}

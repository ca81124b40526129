//! Worker binary

use clap::{Parser, Subcommand};
use shardcoord::common::Config;
use shardcoord::shard::WorkerServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardcoord-worker")]
#[command(about = "shardcoord worker node hosting collection shards")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start worker server
    Serve {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Node ID, as listed in the coordinator's `nodes`
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Disk capacity advertised for the stable_disk tier, in bytes
        #[arg(long)]
        disk_capacity: Option<u64>,
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
            disk_capacity,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(id) = id {
                config.node_id = id;
            }
            if let Some(bind) = bind {
                config.worker.bind_addr = bind;
            }
            if let Some(bytes) = disk_capacity {
                config.worker.disk_capacity_bytes = bytes;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let server = WorkerServer::new(config.worker, config.node_id);
            server.serve().await?;
        }
    }

    Ok(())
}

use anyhow::Context;
use cachemesh::{ClusterNode, NodeConfig};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser, Debug)]
#[command(about = "A peer-to-peer replicated in-memory cache node")]
struct Cli {
    /// Path to a JSON node configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Node id; defaults to the gossip address.
    #[arg(long)]
    id: Option<String>,
    /// Gossip bind address. The cache RPC endpoint listens one port above.
    #[arg(long)]
    gossip_addr: Option<SocketAddr>,
    /// Seed node gossip address; repeat for multiple seeds.
    #[arg(long = "seed")]
    seeds: Vec<SocketAddr>,
    /// Replication factor override.
    #[arg(long)]
    replication_factor: Option<usize>,
    /// Bound on the number of cache entries.
    #[arg(long)]
    max_size: Option<u64>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => NodeConfig::default(),
        };

        // Flags override the file.
        if let Some(id) = self.id {
            config.id = Some(id);
        }
        if let Some(addr) = self.gossip_addr {
            config.gossip_addr = addr;
        }
        if !self.seeds.is_empty() {
            config.seeds = self.seeds;
        }
        if let Some(rf) = self.replication_factor {
            config.replication.replication_factor = rf;
        }
        if let Some(max_size) = self.max_size {
            config.cache.max_size = Some(max_size);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logs on stderr; RUST_LOG overrides the INFO default.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let config = Cli::parse().into_config()?;
    let node = ClusterNode::new(config).context("failed to build cluster node")?;
    node.start().await.context("failed to start cluster node")?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("caught SIGTERM; leaving cluster"),
        _ = sigint.recv() => tracing::info!("caught SIGINT; leaving cluster"),
    }

    node.stop().await;
    Ok(())
}

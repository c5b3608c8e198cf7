use clap::Parser;
use seqnet_node::config::{NodeConfig, SequencerConfig};
use seqnet_node::launch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command line arguments for a headless node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on (e.g., "127.0.0.1:7000"), overrides the config file
    #[arg(short, long)]
    address: Option<String>,

    /// Peers to connect to on start, added to the config file's list
    #[arg(short = 'p', long = "peer")]
    peers: Vec<String>,

    /// Sequencer secret key (32 bytes in hex format); promotes this node
    #[arg(short, long)]
    seed: Option<String>,

    /// Transactions per block when sequencing
    #[arg(short, long, default_value_t = 10)]
    block_size: usize,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => match NodeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config: {}", e);
                return;
            }
        },
        None => NodeConfig::default(),
    };
    if let Some(address) = args.address {
        config.listen_address = address;
    }
    config.bootstrap.extend(args.peers);
    if let Some(seed) = args.seed {
        config.sequencer = Some(SequencerConfig {
            secret_key: seed,
            block_size: args.block_size,
        });
    }

    let launched = match launch(&config).await {
        Ok(launched) => launched,
        Err(e) => {
            error!("Failed to start node: {}", e);
            return;
        }
    };
    info!("Node {} running", launched.node.own());

    tokio::select! {
        result = launched.handle => match result {
            Ok(Ok(())) => info!("Node stopped"),
            Ok(Err(e)) => error!("Node failed: {}", e),
            Err(e) => error!("Node task panicked: {}", e),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            for e in launched.node.close().await {
                error!("Error closing connection: {}", e);
            }
        }
    }
}

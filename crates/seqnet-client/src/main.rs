use clap::Parser;
use seqnet_client::{rest_api, Client, Shell};
use seqnet_node::config::NodeConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Command line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file of the embedded node
    #[arg(short, long)]
    config: Option<String>,

    /// Address the embedded node listens on
    #[arg(short, long)]
    address: Option<String>,

    /// Peers to connect to on start
    #[arg(short = 'p', long = "peer")]
    peers: Vec<String>,

    /// Serve the REST API on this address
    #[arg(short, long)]
    rest: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
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

    println!("Configuring client ...");
    let client = match Client::start(&config).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            println!("Fatal error: {e}");
            return;
        }
    };
    println!("Client configured ...");

    if let Some(addr) = args.rest {
        let app = rest_api::router(client.clone());
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                info!("Starting REST API on {}", addr);
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        error!("REST API stopped: {}", e);
                    }
                });
            }
            Err(e) => error!("Failed to bind REST API on {}: {}", addr, e),
        }
    }

    let mut shell = Shell::new(
        &client,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );
    if let Err(e) = shell.run().await {
        error!("Shell failed: {}", e);
    }
}

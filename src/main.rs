use clap::Parser;
use seqnet_client::{rest_api, Client};
use seqnet_common::{Crypto, SeqnetError, TransactionStatus};
use seqnet_node::config::{AccountEntry, NodeConfig, SequencerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Runs a throwaway network on localhost: node 0 sequences, the others join
/// through it, and a funded account makes a few transfers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of nodes, including the sequencer
    #[arg(short, long, default_value_t = 4)]
    nodes: usize,

    /// Transfers to make from the funded account
    #[arg(short, long, default_value_t = 5)]
    transfers: usize,

    /// Transactions per block
    #[arg(short, long, default_value_t = 1)]
    block_size: usize,

    /// Balance of the funded account
    #[arg(long, default_value_t = 1000.0)]
    funds: f64,

    /// Print each node's configuration as YAML before starting
    #[arg(long)]
    dump_config: bool,

    /// Keep running and serve the REST API of the last node on this address
    #[arg(short, long)]
    rest: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        error!("Devnet failed: {}", e);
    }
}

async fn run(args: Args) -> Result<(), SeqnetError> {
    if args.nodes < 2 {
        return Err(SeqnetError::ConfigError(
            "a devnet needs at least 2 nodes".to_string(),
        ));
    }
    let sequencer = Crypto::generate();
    let faucet = Crypto::generate();
    let accounts = vec![AccountEntry {
        account: faucet.account(),
        balance: args.funds,
    }];

    let mut clients: Vec<Arc<Client>> = Vec::with_capacity(args.nodes);
    for i in 0..args.nodes {
        let mut config = NodeConfig {
            accounts: accounts.clone(),
            ..NodeConfig::default()
        };
        match clients.first() {
            None => {
                config.sequencer = Some(SequencerConfig {
                    secret_key: sequencer.secret_hex(),
                    block_size: args.block_size,
                });
            }
            Some(first) => config.bootstrap = vec![first.addr().to_string()],
        }
        if args.dump_config {
            match serde_yaml::to_string(&config) {
                Ok(yaml) => println!("# node {i}\n{yaml}"),
                Err(e) => warn!("Failed to render config of node {}: {}", i, e),
            }
        }
        let client = Client::start(&config).await?;
        info!(node = i, addr = %client.addr(), "Node started");
        clients.push(Arc::new(client));
    }

    wait_until("every node to learn the sequencer key", || async {
        for client in &clients {
            if client.node().sequencer_key().await != Some(sequencer.public_key()) {
                return false;
            }
        }
        true
    })
    .await?;

    let wallet = clients[clients.len() - 1].clone();
    wallet.provide_credentials(faucet.clone()).await;
    let mut submitted = Vec::with_capacity(args.transfers);
    for n in 1..=args.transfers {
        let recipient = Crypto::generate().account();
        let id = wallet.transfer(n as f64, &recipient).await?;
        submitted.push((id, recipient));
    }

    let expected_blocks = (args.transfers / args.block_size) as u64;
    wait_until("every node to apply all blocks", || async {
        for client in &clients {
            if client.node().latest_block().await < expected_blocks {
                return false;
            }
        }
        true
    })
    .await?;

    for (id, recipient) in &submitted {
        let status = wallet.tx_status(id)?;
        let status = match status {
            TransactionStatus::Pending => "pending".to_string(),
            TransactionStatus::Confirmed { block } => format!("block {block}"),
        };
        println!("transfer {id} -> {recipient}: {status}");
    }
    println!();
    for (i, client) in clients.iter().enumerate() {
        let balance = client.balance(&faucet.account()).await;
        println!(
            "node {i} ({}): latest block {}, peers {}, funded account balance {balance}",
            client.addr(),
            client.node().latest_block().await,
            client.peers().await.len(),
        );
    }

    if let Some(addr) = args.rest {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SeqnetError::NetworkError(e.to_string()))?;
        info!("Serving REST API of node {} on {}", clients.len() - 1, addr);
        axum::serve(listener, rest_api::router(wallet.clone()))
            .await
            .map_err(|e| SeqnetError::NetworkError(e.to_string()))?;
    }

    for client in &clients {
        for e in client.close().await {
            warn!("Error closing connection: {}", e);
        }
    }
    Ok(())
}

async fn wait_until<F, Fut>(what: &str, mut check: F) -> Result<(), SeqnetError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err(SeqnetError::NetworkError(format!("timed out waiting for {what}")))
}

use dashmap::DashMap;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use seqnet_common::{
    Crypto, Ledger, LedgerTrait, Peer, SeqnetError, Transaction, TransactionId, TransactionStatus,
};
use seqnet_node::config::NodeConfig;
use seqnet_node::{launch, metrics, Launched, Node, NodeEvent};
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

lazy_static! {
    static ref TX_SUBMITTED: IntCounter =
        IntCounter::new("seqnet_tx_submitted_total", "Transfers submitted by this client").unwrap();
    static ref TX_CONFIRMED: IntCounter =
        IntCounter::new("seqnet_tx_confirmed_total", "Submitted transfers seen in a block").unwrap();
}

static INIT: Once = Once::new();

fn init_metrics() {
    INIT.call_once(|| {
        metrics::register(Box::new(TX_SUBMITTED.clone()));
        metrics::register(Box::new(TX_CONFIRMED.clone()));
    });
}

/// A wallet on top of an embedded node: holds the user's keys, submits
/// transfers and follows them until a block includes them.
pub struct Client {
    node: Arc<Node>,
    ledger: Arc<Ledger>,
    credentials: RwLock<Option<Crypto>>,
    tx_status: Arc<DashMap<TransactionId, TransactionStatus>>,
    node_task: JoinHandle<Result<(), SeqnetError>>,
    tracker: JoinHandle<()>,
}

impl Client {
    /// Starts a node from `config` and wraps it.
    pub async fn start(config: &NodeConfig) -> Result<Self, SeqnetError> {
        Ok(Self::new(launch(config).await?))
    }

    pub fn new(launched: Launched) -> Self {
        init_metrics();
        let tx_status = Arc::new(DashMap::new());
        let tracker = tokio::spawn(track_confirmations(
            launched.node.subscribe(),
            tx_status.clone(),
        ));
        Client {
            node: launched.node,
            ledger: launched.ledger,
            credentials: RwLock::new(None),
            tx_status,
            node_task: launched.handle,
            tracker,
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn addr(&self) -> SocketAddr {
        self.node.own().addr
    }

    /// Uses `keys` for every later transfer.
    pub async fn provide_credentials(&self, keys: Crypto) {
        info!(account = %keys.account(), "Credentials set");
        *self.credentials.write().await = Some(keys);
    }

    /// Generates a fresh key pair, installs it and returns a copy so the
    /// caller can show the secret to the user.
    pub async fn generate_credentials(&self) -> Crypto {
        let keys = Crypto::generate();
        self.provide_credentials(keys.clone()).await;
        keys
    }

    pub async fn account(&self) -> Option<String> {
        self.credentials.read().await.as_ref().map(Crypto::account)
    }

    pub async fn balance(&self, account: &str) -> f64 {
        self.ledger.balance(account).await
    }

    /// Signs a transfer from the logged in account and hands it to the node.
    /// The balance check here is advisory; the ledger checks again when the
    /// block is applied.
    pub async fn transfer(&self, amount: f64, to: &str) -> Result<TransactionId, SeqnetError> {
        let credentials = self.credentials.read().await;
        let keys = credentials.as_ref().ok_or(SeqnetError::InvalidCredentials)?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(SeqnetError::InvalidAmount(amount));
        }
        let from = keys.account();
        let balance = self.ledger.balance(&from).await;
        if balance < amount {
            return Err(SeqnetError::InsufficientFunds {
                account: from,
                balance,
                amount,
            });
        }

        let id = Uuid::new_v4().to_string();
        let tx = Transaction::new(id.clone(), from, to, amount).sign(keys)?;
        self.tx_status.insert(id.clone(), TransactionStatus::Pending);
        if let Err(e) = self.node.submit_transaction(tx).await {
            self.tx_status.remove(&id);
            return Err(e);
        }
        TX_SUBMITTED.inc();
        info!(tx_id = %id, to = %to, amount, "Transfer submitted");
        Ok(id)
    }

    pub fn tx_status(&self, id: &str) -> Result<TransactionStatus, SeqnetError> {
        self.tx_status
            .get(id)
            .map(|status| status.value().clone())
            .ok_or_else(|| SeqnetError::UnknownTransaction(id.to_string()))
    }

    pub async fn connect(&self, addr: SocketAddr) -> Result<(), SeqnetError> {
        self.node.connect(addr).await
    }

    pub async fn peers(&self) -> Vec<Peer> {
        self.node.peers().await
    }

    pub async fn close(&self) -> Vec<SeqnetError> {
        self.tracker.abort();
        let errors = self.node.close().await;
        self.node_task.abort();
        errors
    }
}

async fn track_confirmations(
    mut events: broadcast::Receiver<NodeEvent>,
    tx_status: Arc<DashMap<TransactionId, TransactionStatus>>,
) {
    loop {
        match events.recv().await {
            Ok(NodeEvent::BlockApplied {
                sequence_number,
                transaction_ids,
            }) => {
                for id in transaction_ids {
                    if let Some(mut status) = tx_status.get_mut(&id) {
                        *status = TransactionStatus::Confirmed {
                            block: sequence_number,
                        };
                        TX_CONFIRMED.inc();
                        info!(tx_id = %id, block = sequence_number, "Transfer confirmed");
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Confirmation tracker fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => {
                error!("Node event channel closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqnet_common::{Block, Packet};
    use seqnet_node::config::{AccountEntry, SequencerConfig};
    use std::time::Duration;

    async fn client_with(keys: &Crypto, balance: f64, sequencer: Option<&Crypto>) -> Client {
        let config = NodeConfig {
            accounts: vec![AccountEntry {
                account: keys.account(),
                balance,
            }],
            sequencer: sequencer.map(|s| SequencerConfig {
                secret_key: s.secret_hex(),
                block_size: 1,
            }),
            ..NodeConfig::default()
        };
        Client::start(&config).await.unwrap()
    }

    #[tokio::test]
    async fn transfer_requires_credentials() {
        let keys = Crypto::generate();
        let client = client_with(&keys, 10.0, None).await;
        assert!(matches!(
            client.transfer(1.0, "someone").await,
            Err(SeqnetError::InvalidCredentials)
        ));
        client.close().await;
    }

    #[tokio::test]
    async fn transfer_checks_amount_and_balance() {
        let keys = Crypto::generate();
        let client = client_with(&keys, 10.0, None).await;
        client.provide_credentials(keys).await;

        assert!(matches!(
            client.transfer(-1.0, "someone").await,
            Err(SeqnetError::InvalidAmount(_))
        ));
        assert!(matches!(
            client.transfer(11.0, "someone").await,
            Err(SeqnetError::InsufficientFunds { .. })
        ));
        assert_eq!(client.node().pool_size().await, 0);
        client.close().await;
    }

    #[tokio::test]
    async fn transfer_stays_pending_without_a_sequencer() {
        let keys = Crypto::generate();
        let client = client_with(&keys, 10.0, None).await;
        client.provide_credentials(keys.clone()).await;

        let id = client.transfer(4.0, "someone").await.unwrap();
        assert_eq!(client.tx_status(&id).unwrap(), TransactionStatus::Pending);
        assert_eq!(client.balance(&keys.account()).await, 10.0);
        assert!(client.tx_status("missing").is_err());
        client.close().await;
    }

    #[tokio::test]
    async fn transfer_on_the_sequencer_is_confirmed() {
        let keys = Crypto::generate();
        let sequencer = Crypto::generate();
        let client = client_with(&keys, 10.0, Some(&sequencer)).await;
        client.provide_credentials(keys.clone()).await;

        let id = client.transfer(4.0, "someone").await.unwrap();
        for _ in 0..100 {
            if client.tx_status(&id).unwrap() != TransactionStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            client.tx_status(&id).unwrap(),
            TransactionStatus::Confirmed { block: 1 }
        );
        assert_eq!(client.balance(&keys.account()).await, 6.0);
        assert_eq!(client.balance("someone").await, 4.0);
        client.close().await;
    }

    #[tokio::test]
    async fn transfers_are_refused_once_the_node_halts() {
        let keys = Crypto::generate();
        let sequencer = Crypto::generate();
        let client = client_with(&keys, 10.0, Some(&sequencer)).await;
        client.provide_credentials(keys).await;

        let ghost = Block {
            sequence_number: 1,
            transaction_ids: vec!["ghost".to_string()],
        }
        .sign(&sequencer)
        .unwrap();
        assert!(matches!(
            client
                .node()
                .handle_packet(Packet::BlockAnnouncement(ghost))
                .await,
            Err(SeqnetError::UnknownTransaction(_))
        ));

        assert!(matches!(
            client.transfer(1.0, "someone").await,
            Err(SeqnetError::Halted(_))
        ));
        assert_eq!(client.node().pool_size().await, 0);
        client.close().await;
    }

    #[tokio::test]
    async fn generated_credentials_become_the_account() {
        let client = Client::start(&NodeConfig::default()).await.unwrap();
        assert!(client.account().await.is_none());
        let keys = client.generate_credentials().await;
        assert_eq!(client.account().await, Some(keys.account()));
        client.close().await;
    }
}

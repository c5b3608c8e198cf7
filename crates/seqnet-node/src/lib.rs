use seqnet_common::{
    account_of, Crypto, Instruction, Ledger, LedgerTrait, Packet, Peer, PeerReply, PublicKey,
    SeqnetError, SignedBlock, SignedTransaction, Socket, TransactionId,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod config;
pub mod directory;
pub mod history;
pub mod memory;
pub mod metrics;
pub mod network;
pub mod pool;
pub mod sequencer;

use crate::config::NodeConfig;
use crate::directory::PeerDirectory;
use crate::history::{Admission, History};
use crate::metrics::{
    init_metrics, BLOCKS_APPLIED, KNOWN_PEERS, LATEST_BLOCK, PACKETS_DROPPED, POOL_SIZE,
};
use crate::network::TcpSocket;
use crate::pool::TransactionPool;
use crate::sequencer::Sequencer;

/// Published to subscribers whenever the local ledger advances.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    BlockApplied {
        sequence_number: u64,
        transaction_ids: Vec<TransactionId>,
    },
}

/// A participant in the ledger network. All protocol state sits behind one
/// lock; handlers run one at a time from [`Node::run`].
pub struct Node {
    own: Peer,
    socket: Arc<dyn Socket>,
    ledger: Arc<dyn LedgerTrait>,
    state: Mutex<NodeState>,
    events: broadcast::Sender<NodeEvent>,
}

/// Internal state of a node.
struct NodeState {
    directory: PeerDirectory,
    history: History,
    pool: TransactionPool,
    latest_block: u64,
    sequencer_key: Option<PublicKey>,
    sequencer: Option<Sequencer>,
    /// Set by the first fatal error; every later packet is refused.
    halted: Option<String>,
}

impl Node {
    pub fn new(socket: Arc<dyn Socket>, ledger: Arc<dyn LedgerTrait>) -> Self {
        init_metrics();
        let own = Peer::new(socket.addr());
        let (events, _) = broadcast::channel(1000);
        Node {
            own,
            socket,
            ledger,
            state: Mutex::new(NodeState {
                directory: PeerDirectory::bootstrap(own),
                history: History::new(),
                pool: TransactionPool::new(),
                latest_block: 0,
                sequencer_key: None,
                sequencer: None,
                halted: None,
            }),
            events,
        }
    }

    pub fn own(&self) -> Peer {
        self.own
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub async fn peers(&self) -> Vec<Peer> {
        self.state.lock().await.directory.peers().to_vec()
    }

    pub async fn sequencer_key(&self) -> Option<PublicKey> {
        self.state.lock().await.sequencer_key
    }

    pub async fn latest_block(&self) -> u64 {
        self.state.lock().await.latest_block
    }

    pub async fn transaction(&self, id: &str) -> Option<SignedTransaction> {
        self.state.lock().await.pool.get(id).cloned()
    }

    pub async fn pool_size(&self) -> usize {
        self.state.lock().await.pool.len()
    }

    /// Why the node stopped, once a fatal error has occurred.
    pub async fn halted(&self) -> Option<String> {
        self.state.lock().await.halted.clone()
    }

    pub async fn is_sequencer(&self) -> bool {
        self.state.lock().await.sequencer.is_some()
    }

    /// Transactions buffered toward the next block, when this node sequences.
    pub async fn sequencer_counter(&self) -> Option<usize> {
        self.state
            .lock()
            .await
            .sequencer
            .as_ref()
            .map(Sequencer::counter)
    }

    /// Makes this node the sequencer: it signs a block every `block_size`
    /// transactions and trusts its own key for block validation.
    pub async fn promote(&self, keys: Crypto, block_size: usize) -> Result<(), SeqnetError> {
        let sequencer = Sequencer::new(keys, block_size)?;
        let mut state = self.state.lock().await;
        state.sequencer_key = Some(sequencer.public_key());
        info!(
            sequencer = %account_of(&sequencer.public_key()),
            block_size,
            "Promoted to sequencer"
        );
        state.sequencer = Some(sequencer);
        Ok(())
    }

    /// Dials `addr`, asks it for its peers and announces the new link.
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), SeqnetError> {
        if addr == self.own.addr {
            return Err(SeqnetError::NetworkError(
                "refusing to connect to self".to_string(),
            ));
        }
        if let Some(reason) = self.halted().await {
            return Err(SeqnetError::Halted(reason));
        }
        self.socket.connect(addr).await?;
        self.socket.send(Packet::PeerRequest(self.own), addr).await?;

        let announcement = Packet::ConnectionAnnouncement(self.own);
        let mut state = self.state.lock().await;
        state.history.record(&announcement)?;
        self.flood(announcement).await;
        drop(state);

        info!(peer = %addr, "Connected");
        Ok(())
    }

    /// Injects a locally created transaction as if it had been received.
    pub async fn submit_transaction(&self, tx: SignedTransaction) -> Result<(), SeqnetError> {
        let mut state = self.state.lock().await;
        self.dispatch(&mut state, Packet::Transaction(tx)).await
    }

    pub async fn close(&self) -> Vec<SeqnetError> {
        self.socket.close().await
    }

    /// The dispatch loop. Runs until the inbound channel closes, or returns the
    /// invariant violation that made continuing unsafe.
    pub async fn run(&self, mut inbound: mpsc::UnboundedReceiver<Packet>) -> Result<(), SeqnetError> {
        while let Some(packet) = inbound.recv().await {
            match self.handle_packet(packet).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(node = %self.own, "Dispatch loop stopped: {}", e);
                    return Err(e);
                }
                Err(e) => warn!(node = %self.own, "Packet handling failed: {}", e),
            }
        }
        info!(node = %self.own, "Inbound channel closed");
        Ok(())
    }

    pub fn spawn(
        self: &Arc<Self>,
        inbound: mpsc::UnboundedReceiver<Packet>,
    ) -> JoinHandle<Result<(), SeqnetError>> {
        let node = self.clone();
        tokio::spawn(async move { node.run(inbound).await })
    }

    /// Handles one packet under the node lock. Only fatal errors are returned;
    /// everything else is logged and the packet dropped.
    pub async fn handle_packet(&self, packet: Packet) -> Result<(), SeqnetError> {
        let mut state = self.state.lock().await;
        self.dispatch(&mut state, packet).await
    }

    async fn dispatch(&self, state: &mut NodeState, packet: Packet) -> Result<(), SeqnetError> {
        if let Some(reason) = &state.halted {
            return Err(SeqnetError::Halted(reason.clone()));
        }
        let instruction = packet.instruction();
        match state.history.admit(&packet, state.latest_block) {
            Ok(Admission::Accept) => {}
            Ok(admission) => {
                debug!(node = %self.own, %instruction, ?admission, "Dropping packet");
                PACKETS_DROPPED.inc();
                return Ok(());
            }
            Err(e) => {
                warn!(node = %self.own, %instruction, "Dropping packet: {}", e);
                PACKETS_DROPPED.inc();
                return Ok(());
            }
        }

        let result = match packet {
            Packet::PeerRequest(requester) => {
                self.handle_peer_request(state, requester).await;
                Ok(())
            }
            Packet::PeerReply(reply) => {
                self.handle_peer_reply(state, reply).await;
                Ok(())
            }
            Packet::ConnectionAnnouncement(peer) => {
                self.handle_connection_announcement(state, peer).await;
                Ok(())
            }
            Packet::Transaction(tx) => self.handle_transaction(state, tx).await,
            Packet::BlockAnnouncement(block) => self.handle_block(state, block).await,
        };

        KNOWN_PEERS.set(state.directory.len() as i64);
        POOL_SIZE.set(state.pool.len() as i64);
        if let Err(e) = &result {
            if e.is_fatal() {
                state.halted = Some(e.to_string());
            }
        }
        result
    }

    async fn handle_peer_request(&self, state: &mut NodeState, requester: Peer) {
        let reply = PeerReply {
            peers: state.directory.peers().to_vec(),
            sequencer_key: state.sequencer_key.as_ref().map(account_of),
        };
        debug!(node = %self.own, requester = %requester, peers = reply.peers.len(), "Answering peer request");
        if let Err(e) = self
            .socket
            .send(Packet::PeerReply(reply), requester.addr)
            .await
        {
            warn!(node = %self.own, requester = %requester, "Failed to send peer reply: {}", e);
        }
    }

    async fn handle_peer_reply(&self, state: &mut NodeState, reply: PeerReply) {
        if let Some(key) = reply.sequencer_key {
            match Crypto::public_key_from_str(&key) {
                Ok(key) => {
                    if state.sequencer_key != Some(key) {
                        info!(node = %self.own, sequencer = %account_of(&key), "Adopted sequencer key");
                    }
                    state.sequencer_key = Some(key);
                }
                Err(e) => warn!(node = %self.own, "Ignoring sequencer key in peer reply: {}", e),
            }
        }
        let added = state.directory.merge(&reply.peers);
        debug!(node = %self.own, added, known = state.directory.len(), "Merged peer reply");
        self.strengthen_network(state.directory.strengthen_candidates());
    }

    /// Dials a bounded slice of the most recently learned peers. Runs on its
    /// own task so slow connects never hold the state lock.
    fn strengthen_network(&self, candidates: Vec<Peer>) {
        let socket = self.socket.clone();
        let own = self.own;
        tokio::spawn(async move {
            for peer in candidates.into_iter().filter(|peer| *peer != own) {
                if let Err(e) = socket.connect(peer.addr).await {
                    warn!(node = %own, peer = %peer, "Failed to strengthen connection: {}", e);
                }
            }
        });
    }

    async fn handle_connection_announcement(&self, state: &mut NodeState, peer: Peer) {
        state.directory.append(peer);
        debug!(node = %self.own, peer = %peer, "Peer announced");
        self.flood(Packet::ConnectionAnnouncement(peer)).await;
    }

    async fn handle_transaction(
        &self,
        state: &mut NodeState,
        tx: SignedTransaction,
    ) -> Result<(), SeqnetError> {
        let id = tx.id().to_string();
        debug!(node = %self.own, tx_id = %id, "Transaction received");
        state.pool.insert(tx.clone());

        let batch = match state.sequencer.as_mut() {
            Some(sequencer) => match tx.verify() {
                Ok(()) => sequencer.push(id),
                Err(e) => {
                    warn!(node = %self.own, tx_id = %id, "Not sequencing transaction: {}", e);
                    None
                }
            },
            None => None,
        };
        self.flood(Packet::Transaction(tx)).await;

        match batch {
            Some(batch) => self.produce_block(state, batch).await,
            None => Ok(()),
        }
    }

    async fn produce_block(
        &self,
        state: &mut NodeState,
        batch: Vec<TransactionId>,
    ) -> Result<(), SeqnetError> {
        let Some(sequencer) = state.sequencer.as_ref() else {
            return Ok(());
        };
        let sequence_number = state.latest_block + 1;
        let block = match sequencer.seal(sequence_number, batch) {
            Ok(block) => block,
            Err(e) => {
                error!(node = %self.own, sequence_number, "Block production aborted: {}", e);
                return Ok(());
            }
        };
        info!(
            node = %self.own,
            sequence_number,
            transactions = block.block.transaction_ids.len(),
            "Sealed block"
        );
        self.handle_block(state, block).await
    }

    async fn handle_block(
        &self,
        state: &mut NodeState,
        block: SignedBlock,
    ) -> Result<(), SeqnetError> {
        let sequence_number = block.sequence_number();
        let Some(sequencer_key) = state.sequencer_key else {
            warn!(node = %self.own, sequence_number, "Dropping block: {}", SeqnetError::UnknownSequencer);
            PACKETS_DROPPED.inc();
            return Ok(());
        };
        if let Err(e) = block.verify(&sequencer_key) {
            warn!(node = %self.own, sequence_number, "Dropping block: {}", e);
            PACKETS_DROPPED.inc();
            return Ok(());
        }
        let expected = state.latest_block + 1;
        if sequence_number != expected {
            warn!(
                node = %self.own,
                "Dropping block: {}",
                SeqnetError::InvalidSequence { expected, got: sequence_number }
            );
            PACKETS_DROPPED.inc();
            return Ok(());
        }

        // Resolve everything before touching the ledger so a missing
        // transaction leaves it untouched.
        let mut transactions = Vec::with_capacity(block.block.transaction_ids.len());
        for id in &block.block.transaction_ids {
            match state.pool.get(id) {
                Some(tx) => transactions.push(tx.clone()),
                None => {
                    error!(node = %self.own, sequence_number, tx_id = %id, "Block references an unseen transaction");
                    return Err(SeqnetError::UnknownTransaction(id.clone()));
                }
            }
        }
        for tx in &transactions {
            if let Err(e) = self.ledger.apply_transaction(tx).await {
                warn!(node = %self.own, tx_id = %tx.id(), "Ledger rejected transaction: {}", e);
            }
        }

        state.latest_block = sequence_number;
        LATEST_BLOCK.set(sequence_number as i64);
        BLOCKS_APPLIED.inc();
        info!(node = %self.own, sequence_number, transactions = transactions.len(), "Applied block");

        // No subscribers is fine.
        let _ = self.events.send(NodeEvent::BlockApplied {
            sequence_number,
            transaction_ids: block.block.transaction_ids.clone(),
        });
        self.flood(Packet::BlockAnnouncement(block)).await;
        Ok(())
    }

    async fn flood(&self, packet: Packet) {
        let instruction: Instruction = packet.instruction();
        for e in self.socket.broadcast(packet).await {
            warn!(node = %self.own, %instruction, "Broadcast failed: {}", e);
        }
    }
}

/// A node wired to a TCP socket and an in-memory ledger.
pub struct Launched {
    pub node: Arc<Node>,
    pub ledger: Arc<Ledger>,
    pub handle: JoinHandle<Result<(), SeqnetError>>,
}

/// Binds, seeds the ledger, promotes if configured, starts the dispatch loop
/// and dials the bootstrap peers. Bootstrap failures are logged only.
pub async fn launch(config: &NodeConfig) -> Result<Launched, SeqnetError> {
    config.validate()?;
    let (socket, inbound) =
        TcpSocket::bind(&config.listen_address, config.advertise_addr()?).await?;
    let ledger = Arc::new(Ledger::with_accounts(config.initial_balances()?));
    let node = Arc::new(Node::new(Arc::new(socket), ledger.clone()));

    if let Some((keys, block_size)) = config.sequencer_keys()? {
        node.promote(keys, block_size).await?;
    }
    let handle = node.spawn(inbound);

    for addr in config.bootstrap_addrs()? {
        if let Err(e) = node.connect(addr).await {
            warn!(peer = %addr, "Bootstrap connection failed: {}", e);
        }
    }
    Ok(Launched {
        node,
        ledger,
        handle,
    })
}

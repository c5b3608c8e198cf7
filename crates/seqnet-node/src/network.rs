use futures_util::{SinkExt, StreamExt};
use seqnet_common::{
    handle_connection, read_handshake, send_handshake, send_message_to_peer, Packet, SeqnetError,
    Socket, WsSink,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, Mutex, RwLock},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, client_async};
use tracing::{debug, info, warn};

type Connections = Arc<RwLock<HashMap<SocketAddr, WsSink>>>;

/// WebSocket-over-TCP transport. Connections are keyed by the remote node's
/// listening address, learned from the handshake frame on inbound links.
pub struct TcpSocket {
    addr: SocketAddr,
    inbound: mpsc::UnboundedSender<Packet>,
    connections: Connections,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl TcpSocket {
    /// Binds `address` and starts accepting. `advertise` overrides the address
    /// other nodes are told to dial, for wildcard binds or NAT.
    pub async fn bind(
        address: &str,
        advertise: Option<SocketAddr>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Packet>), SeqnetError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| SeqnetError::NetworkError(e.to_string()))?;
        let local = listener
            .local_addr()
            .map_err(|e| SeqnetError::NetworkError(e.to_string()))?;
        let addr = advertise.unwrap_or(local);
        if addr.ip().is_unspecified() {
            warn!(
                "Listening on wildcard address {}; peers cannot dial it back without an advertised address",
                addr
            );
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let connections: Connections = Arc::new(RwLock::new(HashMap::new()));
        let task = tokio::spawn(accept_loop(listener, tx.clone(), connections.clone()));

        info!("WebSocket server listening on {}", local);
        Ok((
            TcpSocket {
                addr,
                inbound: tx,
                connections,
                listener: Mutex::new(Some(task)),
            },
            rx,
        ))
    }

    pub async fn connected_peers(&self) -> Vec<SocketAddr> {
        self.connections.read().await.keys().copied().collect()
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::UnboundedSender<Packet>,
    connections: Connections,
) {
    while let Ok((stream, remote)) = listener.accept().await {
        let tx = tx.clone();
        let connections = connections.clone();
        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws_stream) => ws_stream,
                Err(e) => {
                    warn!(remote = %remote, "WebSocket upgrade failed: {}", e);
                    return;
                }
            };
            let (write, mut read) = ws_stream.split();
            let peer = match read_handshake(&mut read).await {
                Ok(peer) => peer,
                Err(e) => {
                    warn!(remote = %remote, "Handshake failed: {}", e);
                    return;
                }
            };
            connections.write().await.insert(peer, write);
            info!(peer = %peer, "Incoming connection accepted");
            handle_connection(read, peer, tx).await;
        });
    }
}

#[async_trait::async_trait]
impl Socket for TcpSocket {
    async fn connect(&self, addr: SocketAddr) -> Result<(), SeqnetError> {
        if self.connections.read().await.contains_key(&addr) {
            debug!(peer = %addr, "Already connected");
            return Ok(());
        }
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SeqnetError::NetworkError(e.to_string()))?;
        let (ws_stream, _) = client_async(format!("ws://{addr}/"), stream)
            .await
            .map_err(|e| SeqnetError::NetworkError(e.to_string()))?;
        let (mut write, read) = ws_stream.split();
        send_handshake(&mut write, self.addr).await?;
        self.connections.write().await.insert(addr, write);

        let tx = self.inbound.clone();
        tokio::spawn(async move {
            handle_connection(read, addr, tx).await;
        });
        info!(peer = %addr, "Outgoing connection established");
        Ok(())
    }

    async fn send(&self, packet: Packet, addr: SocketAddr) -> Result<(), SeqnetError> {
        let mut connections = self.connections.write().await;
        let sink = connections
            .get_mut(&addr)
            .ok_or(SeqnetError::NotConnected(addr))?;
        send_message_to_peer(sink, &packet).await
    }

    async fn broadcast(&self, packet: Packet) -> Vec<SeqnetError> {
        let mut connections = self.connections.write().await;
        let mut errors = Vec::new();
        let mut disconnected = Vec::new();

        for (addr, sink) in connections.iter_mut() {
            if let Err(e) = send_message_to_peer(sink, &packet).await {
                warn!("Failed to send to peer {}: {}", addr, e);
                disconnected.push(*addr);
                errors.push(e);
            }
        }

        for addr in disconnected {
            connections.remove(&addr);
            info!("Connection to {} dropped", addr);
        }
        errors
    }

    async fn close(&self) -> Vec<SeqnetError> {
        if let Some(task) = self.listener.lock().await.take() {
            task.abort();
        }
        let mut connections = self.connections.write().await;
        let mut errors = Vec::new();
        for (addr, mut sink) in connections.drain() {
            if let Err(e) = sink.close().await {
                debug!(peer = %addr, "Close failed: {}", e);
                errors.push(SeqnetError::NetworkError(e.to_string()));
            }
        }
        errors
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }
}

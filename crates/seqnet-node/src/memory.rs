use async_trait::async_trait;
use seqnet_common::{Packet, SeqnetError, Socket};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// In-process transport that records what the node sends instead of writing
/// to the network. Packets are fed to the node with [`MemorySocket::inject`].
pub struct MemorySocket {
    addr: SocketAddr,
    inbound: mpsc::UnboundedSender<Packet>,
    sent: Mutex<Vec<(Packet, SocketAddr)>>,
    broadcasts: Mutex<Vec<Packet>>,
    connections: Mutex<Vec<SocketAddr>>,
    unreachable: Mutex<HashSet<SocketAddr>>,
}

impl MemorySocket {
    pub fn new(addr: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = MemorySocket {
            addr,
            inbound: tx,
            sent: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
        };
        (Arc::new(socket), rx)
    }

    /// Delivers `packet` as if it had arrived from the network.
    pub fn inject(&self, packet: Packet) -> Result<(), SeqnetError> {
        self.inbound
            .send(packet)
            .map_err(|e| SeqnetError::NetworkError(e.to_string()))
    }

    /// Makes later `connect` calls to `addr` fail.
    pub async fn set_unreachable(&self, addr: SocketAddr) {
        self.unreachable.lock().await.insert(addr);
    }

    pub async fn sent(&self) -> Vec<(Packet, SocketAddr)> {
        self.sent.lock().await.clone()
    }

    pub async fn broadcasts(&self) -> Vec<Packet> {
        self.broadcasts.lock().await.clone()
    }

    /// Every address `connect` was called with, in call order.
    pub async fn connection_attempts(&self) -> Vec<SocketAddr> {
        self.connections.lock().await.clone()
    }
}

#[async_trait]
impl Socket for MemorySocket {
    async fn connect(&self, addr: SocketAddr) -> Result<(), SeqnetError> {
        self.connections.lock().await.push(addr);
        if self.unreachable.lock().await.contains(&addr) {
            return Err(SeqnetError::NetworkError(format!("{addr} unreachable")));
        }
        Ok(())
    }

    async fn send(&self, packet: Packet, addr: SocketAddr) -> Result<(), SeqnetError> {
        self.sent.lock().await.push((packet, addr));
        Ok(())
    }

    async fn broadcast(&self, packet: Packet) -> Vec<SeqnetError> {
        self.broadcasts.lock().await.push(packet);
        Vec::new()
    }

    async fn close(&self) -> Vec<SeqnetError> {
        Vec::new()
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }
}

use crate::errors::SeqnetError;
use crate::packet::{wire_config, Packet};
use crate::types::{canonical_bytes, Peer};
use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::net::SocketAddr;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    tungstenite::{self, Message as TungMessage},
    WebSocketStream,
};
use tracing::{debug, warn};

pub type WsSink = SplitSink<WebSocketStream<TcpStream>, TungMessage>;
pub type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Multiplexed connections to other nodes. Every inbound packet, whichever
/// connection it arrived on, is delivered once on the channel handed out
/// when the socket is created.
#[async_trait]
pub trait Socket: Send + Sync {
    /// Opens a connection to `addr`. Succeeds without dialing when a
    /// connection to `addr` already exists.
    async fn connect(&self, addr: SocketAddr) -> Result<(), SeqnetError>;
    async fn send(&self, packet: Packet, addr: SocketAddr) -> Result<(), SeqnetError>;
    /// Sends to every connection, returning one error per failed write.
    async fn broadcast(&self, packet: Packet) -> Vec<SeqnetError>;
    async fn close(&self) -> Vec<SeqnetError>;
    /// The listening address, which is also this node's peer identity.
    fn addr(&self) -> SocketAddr;
}

/// Reads frames off one connection until it ends, forwarding decoded packets.
pub async fn handle_connection(
    mut read: WsStream,
    remote: SocketAddr,
    tx: mpsc::UnboundedSender<Packet>,
) {
    while let Some(Ok(msg)) = read.next().await {
        match msg {
            tungstenite::Message::Binary(data) => match Packet::decode(&data) {
                Ok(packet) => {
                    if tx.send(packet).is_err() {
                        tracing::error!("Failed to send packet to inbound channel");
                        break;
                    }
                }
                Err(e) => warn!(peer = %remote, "Dropping packet: {}", e),
            },
            tungstenite::Message::Close(_) => break,
            _ => {}
        }
    }
    debug!(peer = %remote, "connection closed");
}

pub async fn send_message_to_peer(sink: &mut WsSink, packet: &Packet) -> Result<(), SeqnetError> {
    let data = packet.encode()?;
    sink.send(TungMessage::Binary(data.into()))
        .await
        .map_err(|e| SeqnetError::NetworkError(e.to_string()))
}

/// First frame on a dialed connection: the dialer's listening address.
pub async fn send_handshake(sink: &mut WsSink, own: SocketAddr) -> Result<(), SeqnetError> {
    let data = canonical_bytes(&Peer::new(own))?;
    sink.send(TungMessage::Binary(data.into()))
        .await
        .map_err(|e| SeqnetError::NetworkError(e.to_string()))
}

pub async fn read_handshake(read: &mut WsStream) -> Result<SocketAddr, SeqnetError> {
    loop {
        match read.next().await {
            Some(Ok(tungstenite::Message::Binary(data))) => {
                let (peer, _): (Peer, usize) =
                    bincode::decode_from_slice(&data, wire_config())
                        .map_err(|e| SeqnetError::MalformedPacket(e.to_string()))?;
                return Ok(peer.addr);
            }
            Some(Ok(tungstenite::Message::Close(_))) | None => {
                return Err(SeqnetError::NetworkError(
                    "connection closed before handshake".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(SeqnetError::NetworkError(e.to_string())),
        }
    }
}

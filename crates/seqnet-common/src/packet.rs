use crate::crypto::digest;
use crate::errors::SeqnetError;
use crate::types::{canonical_bytes, Peer, SignedBlock, SignedTransaction};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PacketDigest = [u8; 32];

/// Upper bound on what decoding one frame may allocate. Length prefixes are
/// checked against it before any buffer is reserved.
pub const MAX_PACKET_SIZE: usize = 4 * 1024 * 1024;

/// Decoding configuration for bytes that arrive from other nodes.
pub fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_PACKET_SIZE>()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct PeerReply {
    pub peers: Vec<Peer>,
    /// Account form of the sequencer key known to the replying node, if any.
    pub sequencer_key: Option<String>,
}

/// Everything nodes say to each other. One variant per instruction, so a
/// payload can never disagree with the instruction it travels under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum Packet {
    /// Carries the requester's own listening address.
    PeerRequest(Peer),
    PeerReply(PeerReply),
    ConnectionAnnouncement(Peer),
    Transaction(SignedTransaction),
    BlockAnnouncement(SignedBlock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    PeerRequest,
    PeerReply,
    ConnectionAnnouncement,
    Transaction,
    BlockAnnouncement,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Instruction::PeerRequest => "peer-request",
            Instruction::PeerReply => "peer-reply",
            Instruction::ConnectionAnnouncement => "connection-announcement",
            Instruction::Transaction => "transaction",
            Instruction::BlockAnnouncement => "block-announcement",
        };
        f.write_str(name)
    }
}

impl Packet {
    pub fn instruction(&self) -> Instruction {
        match self {
            Packet::PeerRequest(_) => Instruction::PeerRequest,
            Packet::PeerReply(_) => Instruction::PeerReply,
            Packet::ConnectionAnnouncement(_) => Instruction::ConnectionAnnouncement,
            Packet::Transaction(_) => Instruction::Transaction,
            Packet::BlockAnnouncement(_) => Instruction::BlockAnnouncement,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SeqnetError> {
        canonical_bytes(self)
    }

    /// Decodes one packet from a frame. Unknown instruction tags, payloads
    /// that do not fit their instruction and trailing bytes are all malformed.
    pub fn decode(frame: &[u8]) -> Result<Packet, SeqnetError> {
        let (packet, read): (Packet, usize) =
            bincode::decode_from_slice(frame, wire_config())
                .map_err(|e| SeqnetError::MalformedPacket(e.to_string()))?;
        if read != frame.len() {
            return Err(SeqnetError::MalformedPacket(format!(
                "{} trailing bytes after {}",
                frame.len() - read,
                packet.instruction()
            )));
        }
        Ok(packet)
    }

    /// Replay-history key: the SHA-256 of the canonical encoding.
    pub fn digest(&self) -> Result<PacketDigest, SeqnetError> {
        Ok(digest(&self.encode()?))
    }
}

pub mod crypto;
pub mod errors;
pub mod ledger;
pub mod network;
pub mod packet;
pub mod types;
pub mod vector_clock;

pub use crypto::{account_of, Crypto};
pub use ed25519_dalek::VerifyingKey as PublicKey;
pub use errors::SeqnetError;
pub use ledger::{Ledger, LedgerTrait};
pub use network::{
    handle_connection, read_handshake, send_handshake, send_message_to_peer, Socket, WsSink,
    WsStream,
};
pub use packet::{wire_config, Instruction, Packet, PacketDigest, PeerReply, MAX_PACKET_SIZE};
pub use types::{
    Block, Peer, SignedBlock, SignedTransaction, Transaction, TransactionId, TransactionStatus,
};
pub use vector_clock::VectorClock;

use std::net::SocketAddr;

#[derive(thiserror::Error, Debug)]
pub enum SeqnetError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Not connected to {0}")]
    NotConnected(SocketAddr),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid configuration")]
    InvalidConfig,
    #[error("No sequencer key known")]
    UnknownSequencer,
    #[error("Invalid sequence number {got}, expected {expected}")]
    InvalidSequence { expected: u64, got: u64 },
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("Insufficient funds in {account}: balance {balance}, requested {amount}")]
    InsufficientFunds {
        account: String,
        balance: f64,
        amount: f64,
    },
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// A block referenced a transaction this node never saw. Continuing would
    /// fork the local ledger from the chain, so the dispatch loop stops.
    #[error("Unknown transaction with ID: {0}")]
    UnknownTransaction(String),
    /// The node stopped after a fatal error and refuses further work.
    #[error("Node halted: {0}")]
    Halted(String),
}

impl SeqnetError {
    /// True for errors that must stop a node's dispatch loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SeqnetError::UnknownTransaction(_) | SeqnetError::Halted(_)
        )
    }
}

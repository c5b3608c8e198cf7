use crate::{crypto::Crypto, errors::SeqnetError};
use bincode::{Decode, Encode};
use ed25519_dalek::VerifyingKey as PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

pub type TransactionId = String;

/// A reachable participant, identified by its listening address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
pub struct Peer {
    pub addr: SocketAddr,
}

impl Peer {
    pub fn new(addr: SocketAddr) -> Self {
        Peer { addr }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Transaction {
    pub id: TransactionId,
    pub from: String,
    pub to: String,
    pub amount: f64,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: f64,
    ) -> Self {
        Transaction {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    /// Signs the transaction. `keys` should own the `from` account, otherwise
    /// the result will never verify.
    pub fn sign(self, keys: &Crypto) -> Result<SignedTransaction, SeqnetError> {
        let message = canonical_bytes(&self)?;
        let signature = keys.sign(&message).to_bytes().to_vec();
        Ok(SignedTransaction {
            transaction: self,
            signature,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    pub fn id(&self) -> &str {
        &self.transaction.id
    }

    /// Checks the signature against the public key encoded in `from`.
    pub fn verify(&self) -> Result<(), SeqnetError> {
        let sender = Crypto::public_key_from_str(&self.transaction.from)?;
        let signature = Crypto::signature_from_bytes(&self.signature)?;
        Crypto::verify(&canonical_bytes(&self.transaction)?, &signature, &sender)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Block {
    pub sequence_number: u64,
    pub transaction_ids: Vec<TransactionId>,
}

impl Block {
    pub fn sign(self, keys: &Crypto) -> Result<SignedBlock, SeqnetError> {
        let message = canonical_bytes(&self)?;
        let signature = keys.sign(&message).to_bytes().to_vec();
        Ok(SignedBlock {
            block: self,
            signature,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SignedBlock {
    pub block: Block,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedBlock {
    pub fn sequence_number(&self) -> u64 {
        self.block.sequence_number
    }

    pub fn verify(&self, sequencer: &PublicKey) -> Result<(), SeqnetError> {
        let signature = Crypto::signature_from_bytes(&self.signature)?;
        Crypto::verify(&canonical_bytes(&self.block)?, &signature, sequencer)
    }
}

/// Where a locally submitted transaction stands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Confirmed { block: u64 },
}

/// The bytes a signature covers.
pub fn canonical_bytes<T: Encode>(value: &T) -> Result<Vec<u8>, SeqnetError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| SeqnetError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_transactions_verify_against_the_sender() {
        let sender = Crypto::generate();
        let tx = Transaction::new("t1", sender.account(), "recipient", 2.5)
            .sign(&sender)
            .unwrap();
        assert!(tx.verify().is_ok());
        assert_eq!(tx.id(), "t1");
    }

    #[test]
    fn transaction_signed_by_a_foreign_key_fails() {
        let sender = Crypto::generate();
        let foreign = Crypto::generate();
        let tx = Transaction::new("t1", sender.account(), "recipient", 1.0)
            .sign(&foreign)
            .unwrap();
        assert!(matches!(tx.verify(), Err(SeqnetError::InvalidSignature)));
    }

    #[test]
    fn altering_a_signed_transaction_breaks_the_signature() {
        let sender = Crypto::generate();
        let mut tx = Transaction::new("t1", sender.account(), "recipient", 1.0)
            .sign(&sender)
            .unwrap();
        tx.transaction.amount = 100.0;
        assert!(tx.verify().is_err());
    }

    #[test]
    fn transaction_from_an_unparsable_account_fails() {
        let keys = Crypto::generate();
        let tx = Transaction::new("t1", "alice", "bob", 1.0).sign(&keys).unwrap();
        assert!(matches!(tx.verify(), Err(SeqnetError::InvalidKey(_))));
    }

    #[test]
    fn blocks_verify_only_against_the_sequencer_key() {
        let sequencer = Crypto::generate();
        let impostor = Crypto::generate();
        let block = Block {
            sequence_number: 1,
            transaction_ids: vec!["a".into(), "b".into()],
        }
        .sign(&sequencer)
        .unwrap();
        assert!(block.verify(&sequencer.public_key()).is_ok());
        assert!(block.verify(&impostor.public_key()).is_err());
        assert_eq!(block.sequence_number(), 1);
    }

    #[test]
    fn truncated_signature_is_invalid() {
        let sequencer = Crypto::generate();
        let mut block = Block {
            sequence_number: 3,
            transaction_ids: vec![],
        }
        .sign(&sequencer)
        .unwrap();
        block.signature.truncate(10);
        assert!(matches!(
            block.verify(&sequencer.public_key()),
            Err(SeqnetError::InvalidSignature)
        ));
    }
}

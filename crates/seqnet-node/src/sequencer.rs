use seqnet_common::{Block, Crypto, PublicKey, SeqnetError, SignedBlock, TransactionId};
use std::collections::VecDeque;

/// Block production state held by a promoted node.
#[derive(Debug)]
pub struct Sequencer {
    crypto: Crypto,
    block_size: usize,
    counter: usize,
    buffer: VecDeque<TransactionId>,
}

impl Sequencer {
    pub fn new(crypto: Crypto, block_size: usize) -> Result<Self, SeqnetError> {
        if block_size == 0 {
            return Err(SeqnetError::InvalidConfig);
        }
        Ok(Sequencer {
            crypto,
            block_size,
            counter: 0,
            buffer: VecDeque::with_capacity(block_size),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.crypto.public_key()
    }

    /// Transactions buffered since the last block.
    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Buffers one transaction id. Once `block_size` ids are buffered they are
    /// drained in arrival order and returned as the next batch.
    pub fn push(&mut self, id: TransactionId) -> Option<Vec<TransactionId>> {
        self.buffer.push_back(id);
        self.counter += 1;
        if self.counter < self.block_size {
            return None;
        }
        let batch: Vec<TransactionId> = self.buffer.drain(..self.block_size).collect();
        self.counter = 0;
        Some(batch)
    }

    pub fn seal(
        &self,
        sequence_number: u64,
        transaction_ids: Vec<TransactionId>,
    ) -> Result<SignedBlock, SeqnetError> {
        Block {
            sequence_number,
            transaction_ids,
        }
        .sign(&self.crypto)
    }
}

use seqnet_common::SignedTransaction;
use std::collections::HashMap;

/// Transactions seen by this node, keyed by id. Blocks name transactions by
/// id only, so this is where their contents are resolved.
#[derive(Debug, Default)]
pub struct TransactionPool {
    transactions: HashMap<String, SignedTransaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins.
    pub fn insert(&mut self, transaction: SignedTransaction) {
        self.transactions
            .insert(transaction.id().to_string(), transaction);
    }

    pub fn get(&self, id: &str) -> Option<&SignedTransaction> {
        self.transactions.get(id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqnet_common::{Crypto, Transaction};

    #[test]
    fn later_transaction_with_the_same_id_overwrites() {
        let keys = Crypto::generate();
        let mut pool = TransactionPool::new();
        pool.insert(
            Transaction::new("t1", keys.account(), "a", 1.0)
                .sign(&keys)
                .unwrap(),
        );
        pool.insert(
            Transaction::new("t1", keys.account(), "b", 2.0)
                .sign(&keys)
                .unwrap(),
        );
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get("t1").unwrap().transaction.to, "b");
        assert!(pool.get("t2").is_none());
    }
}

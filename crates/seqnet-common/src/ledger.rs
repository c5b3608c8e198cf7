use crate::errors::SeqnetError;
use crate::types::SignedTransaction;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Balance storage the node applies sequenced transactions to.
#[async_trait]
pub trait LedgerTrait: Send + Sync {
    /// Verifies `transaction` and moves its amount. Nothing changes on error.
    async fn apply_transaction(&self, transaction: &SignedTransaction) -> Result<(), SeqnetError>;
    async fn balance(&self, account: &str) -> f64;
    async fn set_balance(&self, account: &str, amount: f64);
}

#[derive(Debug, Default)]
pub struct Ledger {
    accounts: Mutex<HashMap<String, f64>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: HashMap<String, f64>) -> Self {
        Ledger {
            accounts: Mutex::new(accounts),
        }
    }

    pub async fn accounts(&self) -> HashMap<String, f64> {
        self.accounts.lock().await.clone()
    }
}

#[async_trait]
impl LedgerTrait for Ledger {
    async fn apply_transaction(&self, transaction: &SignedTransaction) -> Result<(), SeqnetError> {
        transaction.verify()?;
        let tx = &transaction.transaction;
        if !tx.amount.is_finite() || tx.amount < 0.0 {
            return Err(SeqnetError::InvalidAmount(tx.amount));
        }

        let mut accounts = self.accounts.lock().await;
        let balance = accounts.get(&tx.from).copied().unwrap_or(0.0);
        if balance < tx.amount {
            return Err(SeqnetError::InsufficientFunds {
                account: tx.from.clone(),
                balance,
                amount: tx.amount,
            });
        }
        accounts.insert(tx.from.clone(), balance - tx.amount);
        *accounts.entry(tx.to.clone()).or_insert(0.0) += tx.amount;
        debug!(tx_id = %tx.id, amount = tx.amount, "transfer applied");
        Ok(())
    }

    async fn balance(&self, account: &str) -> f64 {
        self.accounts
            .lock()
            .await
            .get(account)
            .copied()
            .unwrap_or(0.0)
    }

    async fn set_balance(&self, account: &str, amount: f64) {
        self.accounts.lock().await.insert(account.to_string(), amount);
    }
}

use crate::domain::{
    errors::TrackerError,
    models::{SignatureInfo, TransactionDetail},
};
use solana_sdk::{pubkey::Pubkey, signature::Signature};

/// A trait representing the read side of the ledger RPC used to track an account.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LedgerClient {
    /// Retrieves the native balance of an account.
    ///
    /// # Arguments
    ///
    /// * `address` - The account to look up.
    ///
    /// # Returns
    ///
    /// * `Result<f64, TrackerError>` - The balance in SOL if successful, or an error if the operation fails.
    async fn get_native_balance(&self, address: &Pubkey) -> Result<f64, TrackerError>;

    /// Retrieves the most recent signatures involving an account, newest first.
    ///
    /// # Arguments
    ///
    /// * `address` - The account to look up.
    /// * `limit` - Maximum number of signatures to return. Must be positive.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<SignatureInfo>, TrackerError>` - At most `limit` signatures if successful, or an error if the operation fails.
    async fn get_signature_history(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, TrackerError>;

    /// Retrieves balance deltas and metadata of a single transaction.
    ///
    /// # Arguments
    ///
    /// * `signature` - The transaction signature.
    ///
    /// # Returns
    ///
    /// * `Result<Option<TransactionDetail>, TrackerError>` - `None` when the ledger no longer has the transaction.
    async fn get_transaction_detail(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionDetail>, TrackerError>;
}

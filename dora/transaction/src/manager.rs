//! Transaction manager trait

use std::sync::Arc;

use crate::transaction::Transaction;

/// Lifecycle management for transactions of one storage implementation.
pub trait TxnManager {
    /// The transaction type that this manager handles
    type Transaction: Transaction;
    /// The error type for operations
    type Error;

    /// Begin a new transaction and register it as active.
    fn begin(&self) -> Result<Arc<Self::Transaction>, Self::Error>;

    /// Unregister a transaction once it committed or aborted.
    fn finish(&self, txn: &Self::Transaction) -> Result<(), Self::Error>;

    /// Number of transactions that began and have not finished yet.
    fn active_count(&self) -> usize;
}

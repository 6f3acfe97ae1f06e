use thiserror::Error;

use crate::id::TxnId;
use crate::transaction::TxnState;

pub type TransactionResult<T> = Result<T, TransactionError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("txn-id overflow, reached {0}")]
    TxnIdOverflow(u64),

    #[error("commit-ts overflow, reached {0}")]
    CommitTsOverflow(u64),

    #[error("transaction {txn} is {state}, expected active")]
    NotActive { txn: TxnId, state: TxnState },

    #[error("transaction {0} not found")]
    NotFound(TxnId),
}

use dora_transaction::TransactionError;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("{table}: key {key} not found")]
    NotFound { table: &'static str, key: String },
    #[error("{table}: key {key} already exists")]
    Duplicate { table: &'static str, key: String },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

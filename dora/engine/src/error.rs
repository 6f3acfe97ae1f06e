use dora_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while building, starting or reconfiguring an engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid transaction graph: {0}")]
    InvalidGraph(String),
    #[error("unknown table {0}")]
    UnknownTable(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Reasons an action could not be placed into a partition queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("partition {partition} of {table} is closed")]
    Closed { table: String, partition: usize },
    #[error("partition {partition} of {table} is full ({capacity} actions)")]
    QueueFull {
        table: String,
        partition: usize,
        capacity: usize,
    },
    #[error("keys {keys} fall outside partition {partition} of {table}")]
    WrongPartition {
        table: String,
        partition: usize,
        keys: String,
    },
    #[error("key {key} is outside the domain of {table}")]
    OutOfDomain { table: String, key: String },
    #[error("unknown table id {0}")]
    UnknownTable(usize),
}

/// Coarse classification reported with every aborted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorClass {
    Storage,
    Routing,
    Enqueue,
    UserData,
    /// Chosen to break a lock wait cycle; retrying may succeed.
    Conflict,
    Internal,
}

/// Why a transaction aborted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrxError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },
    #[error("Enqueue error: {0}")]
    Enqueue(#[from] EnqueueError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("deadlock waiting for key {key}")]
    Deadlock { key: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl TrxError {
    pub fn not_found(what: &'static str, key: impl ToString) -> Self {
        TrxError::NotFound {
            what,
            key: key.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            TrxError::Storage(_) => ErrorClass::Storage,
            TrxError::NotFound { .. } | TrxError::InvalidInput(_) => ErrorClass::UserData,
            TrxError::Enqueue(
                EnqueueError::Closed { .. } | EnqueueError::QueueFull { .. },
            ) => ErrorClass::Enqueue,
            TrxError::Enqueue(_) => ErrorClass::Routing,
            TrxError::Deadlock { .. } => ErrorClass::Conflict,
            TrxError::Internal(_) => ErrorClass::Internal,
        }
    }
}

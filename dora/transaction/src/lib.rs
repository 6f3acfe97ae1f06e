//! Common transaction infrastructure for the DORA engine.
//!
//! This crate holds the pieces shared by the storage collaborator and the
//! execution engine: transaction identifiers, the [`Transaction`] trait, the
//! [`TxnManager`] trait and a generic undo log.

pub mod error;
pub mod id;
pub mod manager;
pub mod transaction;
pub mod undo;

pub use error::{TransactionError, TransactionResult};
pub use id::{CommitTs, CommitTsGenerator, TxnId, TxnIdGenerator};
pub use manager::TxnManager;
pub use transaction::{Transaction, TxnState, TxnStateCell};
pub use undo::UndoLog;

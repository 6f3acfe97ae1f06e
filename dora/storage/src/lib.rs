//! In-memory storage collaborator used by the DORA engine.
//!
//! Tables are ordered maps with per-transaction before-image undo. Nothing
//! here takes row locks: the engine guarantees that every key range is only
//! ever touched by the worker that owns it.

pub mod error;
pub mod table;
pub mod txn;

pub use error::{StorageError, StorageResult};
pub use table::MemTable;
pub use txn::{MemTxnManager, StorageTxn};

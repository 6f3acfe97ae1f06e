//! Transaction trait and related functionality

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{TransactionError, TransactionResult};
use crate::id::{CommitTs, TxnId};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxnState {
    Active = 0,
    Committed = 1,
    Aborted = 2,
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxnState::Active => "active",
            TxnState::Committed => "committed",
            TxnState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Atomic holder of a [`TxnState`] that allows exactly one transition out of
/// `Active`.
#[derive(Debug)]
pub struct TxnStateCell(AtomicU8);

impl TxnStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(TxnState::Active as u8))
    }

    pub fn get(&self) -> TxnState {
        match self.0.load(Ordering::Acquire) {
            0 => TxnState::Active,
            1 => TxnState::Committed,
            _ => TxnState::Aborted,
        }
    }

    /// Moves the state from `Active` to `to`. Fails if another transition
    /// already happened.
    pub fn finish(&self, txn: TxnId, to: TxnState) -> TransactionResult<()> {
        self.0
            .compare_exchange(
                TxnState::Active as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| TransactionError::NotActive {
                txn,
                state: self.get(),
            })
    }
}

impl Default for TxnStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait defining the core operations that all transactions must support.
pub trait Transaction: Send + Sync {
    /// The error type for transaction operations
    type Error;

    /// Get the transaction ID
    fn txn_id(&self) -> TxnId;

    /// Get the current lifecycle state
    fn state(&self) -> TxnState;

    /// Commit the transaction, returning the commit timestamp on success
    fn commit(&self) -> Result<CommitTs, Self::Error>;

    /// Abort the transaction and rollback all changes
    fn abort(&self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions_once() {
        let cell = TxnStateCell::new();
        let txn = TxnId::new(7);
        assert_eq!(cell.get(), TxnState::Active);
        cell.finish(txn, TxnState::Committed).unwrap();
        assert_eq!(cell.get(), TxnState::Committed);
        assert_eq!(
            cell.finish(txn, TxnState::Aborted),
            Err(TransactionError::NotActive {
                txn,
                state: TxnState::Committed
            })
        );
    }
}

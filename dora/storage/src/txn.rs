use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam_skiplist::SkipMap;
use dora_transaction::{
    CommitTs, CommitTsGenerator, Transaction, TransactionError, TxnId, TxnIdGenerator,
    TxnManager, TxnState, TxnStateCell, UndoLog,
};
use tracing::trace;

use crate::error::{StorageError, StorageResult};

/// A single reversible change recorded by a table operation.
pub(crate) trait UndoRecord: Send {
    fn undo(self: Box<Self>);
}

/// Bookkeeping shared between the manager and the transactions it created.
#[derive(Default)]
struct Registry {
    active: SkipMap<TxnId, ()>,
    commit_ts: CommitTsGenerator,
    committed: AtomicU64,
    aborted: AtomicU64,
}

impl Registry {
    fn finish(&self, txn_id: TxnId) -> StorageResult<()> {
        if self.active.remove(&txn_id).is_none() {
            return Err(TransactionError::NotFound(txn_id).into());
        }
        Ok(())
    }
}

/// Storage-side handle of one transaction.
pub struct StorageTxn {
    txn_id: TxnId,
    state: TxnStateCell,
    commit_ts: OnceLock<CommitTs>,
    undo: UndoLog<Box<dyn UndoRecord>>,
    registry: Arc<Registry>,
}

impl fmt::Debug for StorageTxn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageTxn")
            .field("txn_id", &self.txn_id)
            .field("state", &self.state.get())
            .field("undo_len", &self.undo.len())
            .finish()
    }
}

impl StorageTxn {
    pub(crate) fn ensure_active(&self) -> StorageResult<()> {
        match self.state.get() {
            TxnState::Active => Ok(()),
            state => Err(TransactionError::NotActive {
                txn: self.txn_id,
                state,
            }
            .into()),
        }
    }

    pub(crate) fn record(&self, undo: Box<dyn UndoRecord>) {
        self.undo.push(undo);
    }

    pub fn commit_ts(&self) -> Option<CommitTs> {
        self.commit_ts.get().copied()
    }

    /// Number of changes that an abort would roll back.
    pub fn pending_changes(&self) -> usize {
        self.undo.len()
    }
}

impl Transaction for StorageTxn {
    type Error = StorageError;

    fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    fn state(&self) -> TxnState {
        self.state.get()
    }

    fn commit(&self) -> StorageResult<CommitTs> {
        self.state.finish(self.txn_id, TxnState::Committed)?;
        let ts = self.registry.commit_ts.next()?;
        let _ = self.commit_ts.set(ts);
        self.undo.clear();
        self.registry.committed.fetch_add(1, Ordering::Relaxed);
        self.registry.finish(self.txn_id)?;
        trace!(txn = %self.txn_id, commit_ts = ts.raw(), "storage commit");
        Ok(ts)
    }

    fn abort(&self) -> StorageResult<()> {
        self.state.finish(self.txn_id, TxnState::Aborted)?;
        let mut undone = 0usize;
        for record in self.undo.take_reversed() {
            record.undo();
            undone += 1;
        }
        self.registry.aborted.fetch_add(1, Ordering::Relaxed);
        self.registry.finish(self.txn_id)?;
        trace!(txn = %self.txn_id, undone, "storage abort");
        Ok(())
    }
}

/// Transaction manager of the in-memory store.
#[derive(Default)]
pub struct MemTxnManager {
    ids: TxnIdGenerator,
    registry: Arc<Registry>,
}

impl MemTxnManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed_count(&self) -> u64 {
        self.registry.committed.load(Ordering::Relaxed)
    }

    pub fn aborted_count(&self) -> u64 {
        self.registry.aborted.load(Ordering::Relaxed)
    }

    pub fn latest_commit_ts(&self) -> CommitTs {
        self.registry.commit_ts.latest()
    }
}

impl TxnManager for MemTxnManager {
    type Error = StorageError;
    type Transaction = StorageTxn;

    fn begin(&self) -> StorageResult<Arc<StorageTxn>> {
        let txn_id = self.ids.next()?;
        self.registry.active.insert(txn_id, ());
        Ok(Arc::new(StorageTxn {
            txn_id,
            state: TxnStateCell::new(),
            commit_ts: OnceLock::new(),
            undo: UndoLog::new(),
            registry: self.registry.clone(),
        }))
    }

    fn finish(&self, txn: &StorageTxn) -> StorageResult<()> {
        if txn.state() == TxnState::Active {
            return Err(TransactionError::NotActive {
                txn: txn.txn_id(),
                state: TxnState::Active,
            }
            .into());
        }
        // commit/abort already unregistered the transaction
        if self.registry.active.contains_key(&txn.txn_id()) {
            self.registry.finish(txn.txn_id())?;
        }
        Ok(())
    }

    fn active_count(&self) -> usize {
        self.registry.active.len()
    }
}

use std::fmt;
use std::sync::Arc;

use dora_storage::StorageTxn;
use dora_transaction::TxnId;
use parking_lot::MutexGuard;

use crate::Workload;
use crate::cache::Cacheable;
use crate::error::TrxError;
use crate::key::ActionKeys;
use crate::part_table::TableId;
use crate::rvp::RvpId;
use crate::txn::TxnContext;

/// The table operation performed by one action.
pub trait ActionBody<W: Workload>: Send + 'static {
    /// Partitioned table the action is routed to.
    fn table(&self) -> TableId;

    /// Down and up keys of the action, derived from its input.
    fn calc_keys(&self) -> ActionKeys;

    /// Read-only actions never receive the storage transaction for writing.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Runs the action on the worker that owns its key range.
    fn execute(&mut self, cx: &ActionContext<'_, W>) -> Result<(), TrxError>;
}

/// One unit of work of one transaction, confined to a single partition.
pub struct Action<W: Workload> {
    txn: Option<Arc<TxnContext<W>>>,
    rvp: RvpId,
    table: TableId,
    keys: ActionKeys,
    read_only: bool,
    body: Option<W::Body>,
}

impl<W: Workload> Action<W> {
    /// Binds a cached instance to a transaction and computes its keys.
    pub(crate) fn bind(&mut self, txn: Arc<TxnContext<W>>, rvp: RvpId, body: W::Body) {
        self.table = body.table();
        self.keys = body.calc_keys();
        self.read_only = body.is_read_only();
        self.txn = Some(txn);
        self.rvp = rvp;
        self.body = Some(body);
    }

    pub fn txn(&self) -> Option<&Arc<TxnContext<W>>> {
        self.txn.as_ref()
    }

    pub fn rvp(&self) -> RvpId {
        self.rvp
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn keys(&self) -> &ActionKeys {
        &self.keys
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn body(&self) -> Option<&W::Body> {
        self.body.as_ref()
    }

    pub(crate) fn execute(&mut self, txn: &TxnContext<W>) -> Result<(), TrxError> {
        let body = self
            .body
            .as_mut()
            .ok_or_else(|| TrxError::Internal("executing an unbound action".into()))?;
        let cx = ActionContext {
            txn,
            rvp: self.rvp,
            read_only: self.read_only,
        };
        body.execute(&cx)
    }
}

impl<W: Workload> Default for Action<W> {
    fn default() -> Self {
        Self {
            txn: None,
            rvp: RvpId::default(),
            table: TableId::default(),
            keys: ActionKeys::default(),
            read_only: false,
            body: None,
        }
    }
}

impl<W: Workload> Cacheable for Action<W> {
    fn reset(&mut self) {
        self.txn = None;
        self.body = None;
        self.keys = ActionKeys::default();
        self.read_only = false;
    }
}

impl<W: Workload> fmt::Debug for Action<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("txn", &self.txn.as_ref().map(|t| t.tid()))
            .field("rvp", &self.rvp)
            .field("table", &self.table)
            .field("keys", &self.keys)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// What an executing action may see of its transaction.
pub struct ActionContext<'a, W: Workload> {
    txn: &'a TxnContext<W>,
    rvp: RvpId,
    read_only: bool,
}

impl<'a, W: Workload> ActionContext<'a, W> {
    pub fn db(&self) -> &'a W::Db {
        self.txn.db()
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn.tid()
    }

    pub fn trx_type(&self) -> W::TrxType {
        self.txn.trx_type()
    }

    /// Storage transaction for writes. Read-only actions get an error.
    pub fn xct_for_update(&self) -> Result<&'a StorageTxn, TrxError> {
        if self.read_only {
            return Err(TrxError::Internal(format!(
                "read-only action of {} asked for write access",
                self.txn.tid()
            )));
        }
        Ok(self.txn.storage())
    }

    /// Phase-carried data of the rendezvous point this action reports to.
    pub fn phase(&self) -> MutexGuard<'a, W::Phase> {
        self.txn.rvp(self.rvp).phase()
    }
}

//! Transaction contexts and the submission-side handles.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use dora_storage::StorageTxn;
use dora_transaction::{Transaction, TxnId, TxnManager};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error, warn};

use crate::Workload;
use crate::action::Action;
use crate::cache::Pooled;
use crate::engine::EngineInner;
use crate::enqueue::{Forward, Wave};
use crate::error::{EngineError, EngineResult, TrxError};
use crate::partition::Partition;
use crate::rvp::{PhaseBody, Rvp, RvpId, RvpKind};

/// How an action left the worker.
pub(crate) enum Outcome {
    Executed(Result<(), TrxError>),
    /// Not executed because the transaction had already failed.
    Skipped,
    /// Never reached a worker.
    Rejected(TrxError),
}

/// State of one in-flight transaction.
///
/// The context owns the whole RVP chain. Actions refer back to it through an
/// `Arc` and name their RVP by index.
pub struct TxnContext<W: Workload> {
    tid: TxnId,
    trx_type: W::TrxType,
    storage: Arc<StorageTxn>,
    started: Instant,
    rvps: SmallVec<[Pooled<Rvp<W>>; 4]>,
    failure: Mutex<Option<TrxError>>,
    aborted: AtomicBool,
    executed: AtomicUsize,
    /// Partitions holding exclusive locks for this transaction.
    lock_holders: Mutex<SmallVec<[Arc<Partition<W>>; 4]>>,
    notify: Sender<TrxResult<W>>,
    engine: Arc<EngineInner<W>>,
}

impl<W: Workload> TxnContext<W> {
    pub fn tid(&self) -> TxnId {
        self.tid
    }

    pub fn trx_type(&self) -> W::TrxType {
        self.trx_type
    }

    pub fn db(&self) -> &W::Db {
        &self.engine.db
    }

    pub fn storage(&self) -> &StorageTxn {
        &self.storage
    }

    pub fn rvp(&self, id: RvpId) -> &Rvp<W> {
        &self.rvps[id.0]
    }

    pub fn rvp_count(&self) -> usize {
        self.rvps.len()
    }

    pub(crate) fn engine(&self) -> &Arc<EngineInner<W>> {
        &self.engine
    }

    /// Whether some action of this transaction already failed.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn failure(&self) -> Option<TrxError> {
        self.failure.lock().clone()
    }

    /// Keeps the first failure; later ones only confirm the abort.
    pub(crate) fn record_failure(&self, err: TrxError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            debug!(txn = %self.tid, %err, "transaction failed");
            *failure = Some(err);
        }
        self.aborted.store(true, Ordering::Release);
    }

    pub(crate) fn locked_in(&self, part: &Arc<Partition<W>>) {
        let mut holders = self.lock_holders.lock();
        if !holders.iter().any(|p| Arc::ptr_eq(p, part)) {
            holders.push(part.clone());
        }
    }

    /// Reports a finished action to its RVP. Returns whether this completion
    /// fired the RVP.
    pub(crate) fn complete(self: &Arc<Self>, action: Pooled<Action<W>>, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Executed(result) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                if let Err(err) = result {
                    self.record_failure(err);
                }
            }
            Outcome::Skipped => {}
            Outcome::Rejected(err) => self.record_failure(err),
        }
        let id = action.rvp();
        let rvp = self.rvp(id);
        rvp.push_completed(action);
        match rvp.post() {
            Ok(true) => {
                self.fire(id);
                true
            }
            Ok(false) => false,
            Err(err) => {
                error!(txn = %self.tid, rvp = id.0, %err, "unexpected completion");
                false
            }
        }
    }

    fn fire(self: &Arc<Self>, id: RvpId) {
        let rvp = self.rvp(id);
        if !rvp.try_fire() {
            error!(txn = %self.tid, rvp = id.0, "rendezvous point fired twice");
            return;
        }
        match rvp.kind() {
            RvpKind::Midway { next } => {
                rvp.hand_over(self.rvp(next));
                if self.is_aborted() {
                    rvp.retire();
                    self.abort_from(next);
                    return;
                }
                debug!(txn = %self.tid, rvp = id.0, "midway fired");
                let mut forward = Forward::new(Wave::new(self.clone(), next), self.rvp(next));
                let built = rvp.phase().forward(&mut forward);
                rvp.retire();
                match built {
                    Ok(()) => forward.into_wave().enqueue(),
                    Err(err) => {
                        drop(forward);
                        self.record_failure(err);
                        self.abort_from(next);
                    }
                }
            }
            RvpKind::Terminal => self.finalize(id),
        }
    }

    /// Fires every RVP from `id` to the terminal without waiting for their
    /// actions. Only valid for RVPs none of whose actions were enqueued.
    pub(crate) fn abort_from(self: &Arc<Self>, mut id: RvpId) {
        loop {
            let rvp = self.rvp(id);
            if !rvp.try_fire() {
                error!(txn = %self.tid, rvp = id.0, "abort reached a fired rendezvous point");
                return;
            }
            match rvp.kind() {
                RvpKind::Midway { next } => {
                    rvp.hand_over(self.rvp(next));
                    rvp.retire();
                    id = next;
                }
                RvpKind::Terminal => {
                    self.finalize(id);
                    return;
                }
            }
        }
    }

    fn finalize(&self, id: RvpId) {
        let rvp = self.rvp(id);
        let failure = self.failure.lock().clone();
        let status = match failure {
            None => match self.storage.commit() {
                Ok(_) => TrxStatus::Committed,
                Err(err) => {
                    error!(txn = %self.tid, %err, "commit failed");
                    if let Err(err) = self.storage.abort() {
                        warn!(txn = %self.tid, %err, "abort after failed commit");
                    }
                    TrxStatus::Aborted(err.into())
                }
            },
            Some(err) => {
                if let Err(err) = self.storage.abort() {
                    error!(txn = %self.tid, %err, "storage abort failed");
                }
                TrxStatus::Aborted(err)
            }
        };
        if let Err(err) = self.engine.txn_manager.finish(&self.storage) {
            warn!(txn = %self.tid, %err, "storage transaction not finished");
        }
        // writes are committed or undone; later writers may touch the rows
        let holders = std::mem::take(&mut *self.lock_holders.lock());
        for part in holders {
            part.release(self.tid);
        }

        let sink = &self.engine.sink;
        sink.inc_attempted(self.trx_type);
        let output = match &status {
            TrxStatus::Committed => {
                sink.inc_committed(self.trx_type);
                rvp.phase().output()
            }
            TrxStatus::Aborted(err) => {
                warn!(txn = %self.tid, trx = %self.trx_type, %err, "transaction aborted");
                sink.inc_aborted(self.trx_type, err.class());
                W::Output::default()
            }
        };
        let result = TrxResult {
            tid: self.tid,
            trx_type: self.trx_type,
            status,
            output,
            latency: self.started.elapsed(),
            actions: self.executed.load(Ordering::Relaxed),
        };
        let _ = self.notify.send(result);

        let mut actions = Vec::new();
        for rvp in &self.rvps {
            actions.extend(rvp.take_completed());
        }
        drop(actions);
        rvp.retire();
    }
}

impl<W: Workload> fmt::Debug for TxnContext<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnContext")
            .field("tid", &self.tid)
            .field("trx_type", &self.trx_type)
            .field("rvps", &self.rvps)
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Declares the RVP chain of a transaction before any action exists.
pub struct TxnBuilder<W: Workload> {
    engine: Arc<EngineInner<W>>,
    trx_type: W::TrxType,
    midways: SmallVec<[(usize, W::Phase); 3]>,
}

impl<W: Workload> TxnBuilder<W> {
    pub(crate) fn new(engine: Arc<EngineInner<W>>, trx_type: W::TrxType) -> Self {
        Self {
            engine,
            trx_type,
            midways: SmallVec::new(),
        }
    }

    /// Appends a midway RVP waiting for `countdown` actions.
    pub fn midway(mut self, countdown: usize, phase: W::Phase) -> Self {
        self.midways.push((countdown, phase));
        self
    }

    /// Closes the chain with the terminal RVP and begins the storage
    /// transaction.
    pub fn terminal(self, countdown: usize, phase: W::Phase) -> EngineResult<Admission<W>> {
        let TxnBuilder {
            engine,
            trx_type,
            midways,
        } = self;
        if countdown == 0 || midways.iter().any(|(c, _)| *c == 0) {
            return Err(EngineError::InvalidGraph(format!(
                "{trx_type}: every rendezvous point needs at least one action"
            )));
        }
        let storage = engine.txn_manager.begin()?;
        let mut rvps = SmallVec::new();
        for (i, (count, phase)) in midways.into_iter().enumerate() {
            let mut rvp = engine.rvps.get();
            rvp.arm(RvpKind::Midway { next: RvpId(i + 1) }, count, phase);
            rvps.push(rvp);
        }
        let mut last = engine.rvps.get();
        last.arm(RvpKind::Terminal, countdown, phase);
        rvps.push(last);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let tid = storage.txn_id();
        debug!(txn = %tid, trx = %trx_type, phases = rvps.len(), "admitted");
        let txn = Arc::new(TxnContext {
            tid,
            trx_type,
            storage,
            started: Instant::now(),
            rvps,
            failure: Mutex::new(None),
            aborted: AtomicBool::new(false),
            executed: AtomicUsize::new(0),
            lock_holders: Mutex::new(SmallVec::new()),
            notify: tx,
            engine,
        });
        Ok(Admission {
            txn,
            handle: TrxHandle { tid, trx_type, rx },
        })
    }
}

/// An admitted transaction whose first phase has not been enqueued yet.
pub struct Admission<W: Workload> {
    txn: Arc<TxnContext<W>>,
    handle: TrxHandle<W>,
}

impl<W: Workload> Admission<W> {
    pub fn txn(&self) -> &Arc<TxnContext<W>> {
        &self.txn
    }

    /// The first phase. Its actions report to the first RVP of the chain.
    pub fn wave(&self) -> Wave<W> {
        Wave::new(self.txn.clone(), RvpId(0))
    }

    /// Aborts before anything was enqueued; the terminal RVP still finalizes
    /// and signals the handle.
    pub fn abort(self, err: TrxError) -> TrxHandle<W> {
        self.txn.record_failure(err);
        self.txn.abort_from(RvpId(0));
        self.handle
    }

    pub fn into_handle(self) -> TrxHandle<W> {
        self.handle
    }
}

/// Commit outcome of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrxStatus {
    Committed,
    Aborted(TrxError),
}

/// What the submitter receives once the terminal RVP finalized.
#[derive(Debug)]
pub struct TrxResult<W: Workload> {
    pub tid: TxnId,
    pub trx_type: W::TrxType,
    pub status: TrxStatus,
    pub output: W::Output,
    pub latency: Duration,
    /// Actions that executed, not counting skipped ones.
    pub actions: usize,
}

impl<W: Workload> TrxResult<W> {
    pub fn is_committed(&self) -> bool {
        self.status == TrxStatus::Committed
    }

    pub fn error(&self) -> Option<&TrxError> {
        match &self.status {
            TrxStatus::Committed => None,
            TrxStatus::Aborted(err) => Some(err),
        }
    }
}

/// Waits for the result of one submitted transaction.
pub struct TrxHandle<W: Workload> {
    tid: TxnId,
    trx_type: W::TrxType,
    rx: Receiver<TrxResult<W>>,
}

impl<W: Workload> TrxHandle<W> {
    pub fn tid(&self) -> TxnId {
        self.tid
    }

    /// Blocks until the terminal RVP signals.
    pub fn wait(self) -> TrxResult<W> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => TrxResult {
                tid: self.tid,
                trx_type: self.trx_type,
                status: TrxStatus::Aborted(TrxError::Internal(
                    "transaction dropped without a result".into(),
                )),
                output: W::Output::default(),
                latency: Duration::ZERO,
                actions: 0,
            },
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<TrxResult<W>> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_wait(&self) -> Option<TrxResult<W>> {
        self.rx.try_recv().ok()
    }
}

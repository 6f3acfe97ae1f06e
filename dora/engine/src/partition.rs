//! A key range of one table and the single worker that owns it.

use std::collections::VecDeque;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dora_transaction::TxnId;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, error, info, trace};

use crate::Workload;
use crate::action::Action;
use crate::cache::Pooled;
use crate::error::{EngineResult, EnqueueError, ErrorClass, TrxError};
use crate::key::ActionKeys;
use crate::lock::{Acquire, LockMode, LockTable, Waiter};
use crate::part_table::TableId;
use crate::txn::{Outcome, TxnContext};

struct Queue<W: Workload> {
    actions: VecDeque<Pooled<Action<W>>>,
    /// Transactions that finalized and hold exclusive locks here.
    released: Vec<TxnId>,
    open: bool,
}

#[derive(Debug, Default)]
struct WorkerCounters {
    processed: AtomicU64,
    served: AtomicU64,
    early_aborts: AtomicU64,
    failures: AtomicU64,
    user_aborts: AtomicU64,
    lock_waits: AtomicU64,
    deadlocks: AtomicU64,
    rvps_fired: AtomicU64,
    locked_keys: AtomicU64,
    waiting: AtomicU64,
}

/// Counters of one partition worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    pub table: String,
    pub partition: usize,
    pub lo: i32,
    pub hi: i32,
    /// Actions taken off the queue.
    pub processed: u64,
    /// Actions executed.
    pub served: u64,
    /// Actions skipped because their transaction had already failed.
    pub early_aborts: u64,
    /// Executed actions that reported an error.
    pub failures: u64,
    /// Failures caused by the input data, a subset of `failures`.
    pub user_aborts: u64,
    /// Actions that had to wait for a lock.
    pub lock_waits: u64,
    /// Actions refused because waiting would have deadlocked.
    pub deadlocks: u64,
    /// Keys locked exclusively right now.
    pub locked_keys: u64,
    /// Actions parked on a lock right now.
    pub waiting: u64,
    /// Rendezvous points fired by completions on this worker.
    pub rvps_fired: u64,
    /// Actions waiting in the queue.
    pub queued: usize,
}

pub struct Partition<W: Workload> {
    table: String,
    table_id: TableId,
    index: usize,
    bounds: RangeInclusive<i32>,
    capacity: Option<usize>,
    idle_wait: Duration,
    queue: Mutex<Queue<W>>,
    wake: Condvar,
    counters: WorkerCounters,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// An action the queue did not accept, handed back with the reason.
pub(crate) struct Rejected<W: Workload> {
    pub(crate) action: Pooled<Action<W>>,
    pub(crate) error: EnqueueError,
}

/// Holds a partition's enqueue lock.
pub(crate) struct EnqueueGuard<'a, W: Workload> {
    part: &'a Partition<W>,
    queue: MutexGuard<'a, Queue<W>>,
}

impl<W: Workload> EnqueueGuard<'_, W> {
    /// Appends `action` at the tail of the queue.
    pub(crate) fn push(
        &mut self,
        action: Pooled<Action<W>>,
        wake: bool,
    ) -> Result<(), Rejected<W>> {
        let part = self.part;
        let error = if !self.queue.open {
            Some(EnqueueError::Closed {
                table: part.table.clone(),
                partition: part.index,
            })
        } else if let Some(capacity) = part.capacity.filter(|c| self.queue.actions.len() >= *c) {
            Some(EnqueueError::QueueFull {
                table: part.table.clone(),
                partition: part.index,
                capacity,
            })
        } else if !part.verify(action.keys()) {
            Some(EnqueueError::WrongPartition {
                table: part.table.clone(),
                partition: part.index,
                keys: action.keys().to_string(),
            })
        } else {
            None
        };
        if let Some(error) = error {
            return Err(Rejected { action, error });
        }
        self.queue.actions.push_back(action);
        if wake {
            part.wake.notify_one();
        }
        Ok(())
    }
}

impl<W: Workload> Partition<W> {
    pub(crate) fn new(
        table: &str,
        table_id: TableId,
        index: usize,
        bounds: RangeInclusive<i32>,
        capacity: Option<usize>,
        idle_wait: Duration,
    ) -> Self {
        Self {
            table: table.to_owned(),
            table_id,
            index,
            bounds,
            capacity,
            idle_wait,
            queue: Mutex::new(Queue {
                actions: VecDeque::new(),
                released: Vec::new(),
                open: false,
            }),
            wake: Condvar::new(),
            counters: WorkerCounters::default(),
            worker: Mutex::new(None),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bounds(&self) -> &RangeInclusive<i32> {
        &self.bounds
    }

    /// Both key vectors must lead with a value inside this partition.
    pub fn verify(&self, keys: &ActionKeys) -> bool {
        let inside = |lead: Option<i32>| lead.is_some_and(|v| self.bounds.contains(&v));
        inside(keys.down.lead()) && inside(keys.up.lead())
    }

    pub(crate) fn lock_queue(&self) -> EnqueueGuard<'_, W> {
        EnqueueGuard {
            part: self,
            queue: self.queue.lock(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.queue.lock().open
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().actions.len()
    }

    /// Opens the queue and spawns the worker if it is not running.
    pub(crate) fn start(self: &Arc<Self>) -> EngineResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        self.queue.lock().open = true;
        let part = self.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-p{}", self.table, self.index))
            .spawn(move || part.run())?;
        *worker = Some(handle);
        info!(
            table = %self.table,
            partition = self.index,
            lo = *self.bounds.start(),
            hi = *self.bounds.end(),
            "worker started"
        );
        Ok(())
    }

    /// Refuses new actions. The worker exits once the queue is empty and no
    /// lock is held or awaited.
    pub(crate) fn close(&self) {
        self.queue.lock().open = false;
        self.wake.notify_all();
    }

    /// Asks the worker to drop the exclusive locks of a finalized
    /// transaction. Accepted even while closed.
    pub(crate) fn release(&self, tid: TxnId) {
        self.queue.lock().released.push(tid);
        self.wake.notify_one();
    }

    pub(crate) fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(table = %self.table, partition = self.index, "worker panicked");
            }
        }
    }

    fn run(self: &Arc<Self>) {
        let mut locks = LockTable::new();
        loop {
            let (released, action) = {
                let mut queue = self.queue.lock();
                loop {
                    if !queue.released.is_empty() {
                        break (std::mem::take(&mut queue.released), None);
                    }
                    if let Some(action) = queue.actions.pop_front() {
                        break (Vec::new(), Some(action));
                    }
                    if !queue.open && locks.is_idle() {
                        info!(table = %self.table, partition = self.index, "worker drained");
                        return;
                    }
                    self.wake.wait_for(&mut queue, self.idle_wait);
                }
            };
            // committed and undone transactions first, then what they unblock
            for tid in released {
                for waiter in locks.release(tid) {
                    self.resume(waiter);
                }
            }
            if let Some(action) = action {
                self.dispatch(&mut locks, action);
            }
            let c = &self.counters;
            c.locked_keys.store(locks.locked_keys() as u64, Ordering::Relaxed);
            c.waiting.store(locks.waiting() as u64, Ordering::Relaxed);
        }
    }

    /// Locks the down key of a dequeued action, then serves or parks it.
    fn dispatch(
        self: &Arc<Self>,
        locks: &mut LockTable<Pooled<Action<W>>>,
        action: Pooled<Action<W>>,
    ) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        let Some(txn) = action.txn().cloned() else {
            error!(table = %self.table, partition = self.index, "dequeued an unbound action");
            return;
        };
        if txn.is_aborted() {
            self.serve(&txn, action);
            return;
        }
        let tid = txn.tid();
        let mode = LockMode::of(action.is_read_only());
        let key = action.keys().down.clone();
        let acquired = locks.acquire(tid, &key, mode, action, |blockers| {
            txn.engine().waits.lock().try_wait(tid, blockers)
        });
        match acquired {
            Acquire::Granted(action) => {
                if mode == LockMode::Exclusive {
                    txn.locked_in(self);
                }
                self.serve(&txn, action);
            }
            Acquire::Parked => {
                self.counters.lock_waits.fetch_add(1, Ordering::Relaxed);
                trace!(txn = %tid, %key, "waiting for lock");
            }
            Acquire::Deadlock(action) => {
                self.counters.deadlocks.fetch_add(1, Ordering::Relaxed);
                debug!(txn = %tid, %key, table = %self.table, "deadlock, aborting requester");
                let err = TrxError::Deadlock {
                    key: key.to_string(),
                };
                if txn.complete(action, Outcome::Rejected(err)) {
                    self.counters.rvps_fired.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Serves an action whose lock was just handed over by a release.
    fn resume(self: &Arc<Self>, waiter: Waiter<Pooled<Action<W>>>) {
        let Waiter {
            tid,
            mode,
            blockers,
            item: action,
        } = waiter;
        let Some(txn) = action.txn().cloned() else {
            error!(table = %self.table, partition = self.index, "parked an unbound action");
            return;
        };
        txn.engine().waits.lock().stop_waiting(tid, &blockers);
        if mode == LockMode::Exclusive {
            txn.locked_in(self);
        }
        self.serve(&txn, action);
    }

    fn serve(&self, txn: &Arc<TxnContext<W>>, mut action: Pooled<Action<W>>) {
        let outcome = if txn.is_aborted() {
            self.counters.early_aborts.fetch_add(1, Ordering::Relaxed);
            trace!(txn = %txn.tid(), keys = %action.keys(), "skipped");
            Outcome::Skipped
        } else {
            let result = action.execute(txn);
            self.counters.served.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = &result {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                if err.class() == ErrorClass::UserData {
                    self.counters.user_aborts.fetch_add(1, Ordering::Relaxed);
                }
            }
            trace!(txn = %txn.tid(), keys = %action.keys(), ok = result.is_ok(), "executed");
            Outcome::Executed(result)
        };
        if txn.complete(action, outcome) {
            self.counters.rvps_fired.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> PartitionStats {
        let c = &self.counters;
        PartitionStats {
            table: self.table.clone(),
            partition: self.index,
            lo: *self.bounds.start(),
            hi: *self.bounds.end(),
            processed: c.processed.load(Ordering::Relaxed),
            served: c.served.load(Ordering::Relaxed),
            early_aborts: c.early_aborts.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            user_aborts: c.user_aborts.load(Ordering::Relaxed),
            lock_waits: c.lock_waits.load(Ordering::Relaxed),
            deadlocks: c.deadlocks.load(Ordering::Relaxed),
            locked_keys: c.locked_keys.load(Ordering::Relaxed),
            waiting: c.waiting.load(Ordering::Relaxed),
            rvps_fired: c.rvps_fired.load(Ordering::Relaxed),
            queued: self.queued(),
        }
    }
}

impl<W: Workload> fmt::Debug for Partition<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("table", &self.table)
            .field("index", &self.index)
            .field("bounds", &self.bounds)
            .finish()
    }
}

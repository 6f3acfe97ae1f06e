//! Building a phase and placing its actions into partition queues.
//!
//! When one phase touches several partitions, the enqueue locks are taken in
//! ascending (table, partition) order and each lock is released only after the
//! next one is held. Every multi-partition enqueue therefore happens in one
//! total order and concurrent submitters never deadlock against each other.

use std::sync::Arc;

use itertools::Itertools;
use parking_lot::MutexGuard;
use tracing::warn;

use crate::Workload;
use crate::action::Action;
use crate::cache::Pooled;
use crate::error::{EnqueueError, TrxError};
use crate::part_table::{PartTable, TableId};
use crate::partition::{EnqueueGuard, Partition};
use crate::rvp::{Rvp, RvpId};
use crate::txn::{Outcome, TxnContext};

/// The actions of one phase of one transaction, all reporting to the same RVP.
pub struct Wave<W: Workload> {
    txn: Arc<TxnContext<W>>,
    rvp: RvpId,
    actions: Vec<Pooled<Action<W>>>,
}

impl<W: Workload> Wave<W> {
    pub(crate) fn new(txn: Arc<TxnContext<W>>, rvp: RvpId) -> Self {
        Self {
            txn,
            rvp,
            actions: Vec::new(),
        }
    }

    /// Binds a cached action to `body`.
    pub fn push(&mut self, body: W::Body) -> &mut Self {
        let mut action = self.txn.engine().actions.get();
        action.bind(self.txn.clone(), self.rvp, body);
        self.actions.push(action);
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Enqueues every action of the phase.
    ///
    /// Actions that cannot be routed or enqueued complete as failures, so the
    /// RVP still fires and aborts this transaction only. A wave whose size
    /// differs from the RVP's countdown is not enqueued at all.
    pub fn enqueue(self) {
        let Wave { txn, rvp, actions } = self;
        let expected = txn.rvp(rvp).outstanding();
        let built = actions.len();
        if built != expected {
            drop(actions);
            txn.record_failure(TrxError::Internal(format!(
                "phase {} of {} built {built} actions for a countdown of {expected}",
                rvp.index(),
                txn.trx_type(),
            )));
            txn.abort_from(rvp);
            return;
        }
        let engine = txn.engine().clone();
        let rejected = {
            let tables = engine.tables.read();
            enqueue_ordered(&tables, actions, engine.config.wake_workers)
        };
        for (action, err) in rejected {
            warn!(txn = %txn.tid(), keys = %action.keys(), %err, "enqueue failed");
            txn.complete(action, Outcome::Rejected(err.into()));
        }
    }
}

/// Gives a midway RVP's phase body access to the next phase.
pub struct Forward<'a, W: Workload> {
    wave: Wave<W>,
    successor: &'a Rvp<W>,
}

impl<'a, W: Workload> Forward<'a, W> {
    pub(crate) fn new(wave: Wave<W>, successor: &'a Rvp<W>) -> Self {
        Self { wave, successor }
    }

    /// Adds an action reporting to the successor RVP.
    pub fn push(&mut self, body: W::Body) -> &mut Self {
        self.wave.push(body);
        self
    }

    /// Phase-carried data of the successor RVP.
    pub fn next_phase(&self) -> MutexGuard<'a, W::Phase> {
        self.successor.phase()
    }

    pub fn db(&self) -> &W::Db {
        self.wave.txn.db()
    }

    pub fn len(&self) -> usize {
        self.wave.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wave.is_empty()
    }

    pub(crate) fn into_wave(self) -> Wave<W> {
        self.wave
    }
}

/// Routes `actions` and enqueues them with lock coupling. Returns the actions
/// that were not accepted.
pub(crate) fn enqueue_ordered<W: Workload>(
    tables: &[Arc<PartTable<W>>],
    actions: Vec<Pooled<Action<W>>>,
    wake: bool,
) -> Vec<(Pooled<Action<W>>, EnqueueError)> {
    let mut rejected = Vec::new();
    let mut routed = Vec::with_capacity(actions.len());
    for action in actions {
        match route(tables, &action) {
            Ok((slot, part)) => routed.push((slot, part, action)),
            Err(err) => rejected.push((action, err)),
        }
    }

    let mut held: Option<((TableId, usize), EnqueueGuard<'_, W>)> = None;
    for (slot, part, action) in routed.into_iter().sorted_by_key(|(slot, _, _)| *slot) {
        if held.as_ref().map(|(s, _)| *s) != Some(slot) {
            let next = part.lock_queue();
            let previous = held.replace((slot, next));
            drop(previous);
        }
        if let Some((_, guard)) = held.as_mut() {
            if let Err(r) = guard.push(action, wake) {
                rejected.push((r.action, r.error));
            }
        }
    }
    drop(held);
    rejected
}

fn route<'t, W: Workload>(
    tables: &'t [Arc<PartTable<W>>],
    action: &Action<W>,
) -> Result<((TableId, usize), &'t Arc<Partition<W>>), EnqueueError> {
    let table = tables
        .get(action.table().0)
        .ok_or(EnqueueError::UnknownTable(action.table().0))?;
    let index = table.route(&action.keys().down)?;
    let part = table
        .partition(index)
        .ok_or_else(|| EnqueueError::OutOfDomain {
            table: table.name().to_owned(),
            key: action.keys().down.to_string(),
        })?;
    Ok(((table.id(), index), part))
}

//! Logical locks local to one partition.
//!
//! A worker locks the down key of every action before running it. Exclusive
//! locks stay with the transaction until it has committed or undone its
//! writes; the terminal rendezvous point then asks every partition that
//! granted one to release them. Shared locks only last while the action runs:
//! readers wait for uncommitted writers but never hold anyone up across
//! phases.
//!
//! Conflicting requests wait in arrival order. Waves are enqueued under lock
//! coupling, so waits inside one wave follow a single order on every
//! partition. A cycle can only close across phases, and the engine-wide
//! [`WaitGraph`] refuses the wait that would close it.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::iter;

use dora_transaction::TxnId;
use serde::Serialize;
use smallvec::SmallVec;

use crate::key::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    pub fn of(read_only: bool) -> Self {
        if read_only {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        }
    }
}

/// Transactions a parked request waits for.
pub(crate) type Blockers = SmallVec<[TxnId; 2]>;

/// A request parked until its key is free.
#[derive(Debug)]
pub(crate) struct Waiter<T> {
    pub(crate) tid: TxnId,
    pub(crate) mode: LockMode,
    pub(crate) blockers: Blockers,
    pub(crate) item: T,
}

#[derive(Debug)]
struct LogicalLock<T> {
    /// Holder of the exclusive lock. A key without one has no entry.
    owner: TxnId,
    waiters: VecDeque<Waiter<T>>,
}

#[derive(Debug)]
pub(crate) enum Acquire<T> {
    Granted(T),
    Parked,
    /// Waiting would close a cycle; the request is handed back.
    Deadlock(T),
}

#[derive(Debug)]
pub(crate) struct LockTable<T> {
    locks: HashMap<Key, LogicalLock<T>>,
    held: HashMap<TxnId, SmallVec<[Key; 4]>>,
}

impl<T> LockTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            locks: HashMap::new(),
            held: HashMap::new(),
        }
    }

    /// Grants `key` to `tid` or parks `item` behind the current holders.
    ///
    /// `may_wait` is asked before parking and decides whether waiting for
    /// the given transactions is allowed.
    pub(crate) fn acquire(
        &mut self,
        tid: TxnId,
        key: &Key,
        mode: LockMode,
        item: T,
        may_wait: impl FnOnce(&[TxnId]) -> bool,
    ) -> Acquire<T> {
        let Some(lock) = self.locks.get_mut(key) else {
            if mode == LockMode::Exclusive {
                self.locks.insert(
                    key.clone(),
                    LogicalLock {
                        owner: tid,
                        waiters: VecDeque::new(),
                    },
                );
                self.held.entry(tid).or_default().push(key.clone());
            }
            return Acquire::Granted(item);
        };
        if lock.owner == tid {
            return Acquire::Granted(item);
        }

        let ahead = lock
            .waiters
            .iter()
            .filter(|w| w.mode == LockMode::Exclusive)
            .map(|w| w.tid);
        let mut blockers = Blockers::new();
        for other in iter::once(lock.owner).chain(ahead) {
            if other != tid && !blockers.contains(&other) {
                blockers.push(other);
            }
        }
        if !may_wait(&blockers) {
            return Acquire::Deadlock(item);
        }
        lock.waiters.push_back(Waiter {
            tid,
            mode,
            blockers,
            item,
        });
        Acquire::Parked
    }

    /// Drops every exclusive lock of `tid` and returns the waiters that may
    /// run now, in arrival order per key.
    pub(crate) fn release(&mut self, tid: TxnId) -> Vec<Waiter<T>> {
        let mut ready = Vec::new();
        let Some(keys) = self.held.remove(&tid) else {
            return ready;
        };
        for key in keys {
            let Entry::Occupied(mut entry) = self.locks.entry(key) else {
                continue;
            };
            if entry.get().owner != tid {
                continue;
            }
            let mut next_owner = None;
            let waiters = &mut entry.get_mut().waiters;
            while let Some(head) = waiters.front() {
                if next_owner.is_some_and(|owner| owner != head.tid) {
                    break;
                }
                if head.mode == LockMode::Exclusive {
                    next_owner = Some(head.tid);
                }
                ready.extend(waiters.pop_front());
            }
            match next_owner {
                Some(owner) => {
                    entry.get_mut().owner = owner;
                    self.held.entry(owner).or_default().push(entry.key().clone());
                }
                None => {
                    entry.remove();
                }
            }
        }
        ready
    }

    /// No key is locked and nobody waits.
    pub(crate) fn is_idle(&self) -> bool {
        self.locks.is_empty()
    }

    pub(crate) fn locked_keys(&self) -> usize {
        self.locks.len()
    }

    pub(crate) fn waiting(&self) -> usize {
        self.locks.values().map(|l| l.waiters.len()).sum()
    }
}

/// Which transaction waits for which, across every partition.
#[derive(Debug, Default)]
pub(crate) struct WaitGraph {
    edges: HashMap<TxnId, Vec<TxnId>>,
}

impl WaitGraph {
    /// Records that `waiter` waits for `blockers`, unless one of them already
    /// waits for `waiter`, directly or through others.
    pub(crate) fn try_wait(&mut self, waiter: TxnId, blockers: &[TxnId]) -> bool {
        if blockers.iter().any(|&b| self.reaches(b, waiter)) {
            return false;
        }
        self.edges
            .entry(waiter)
            .or_default()
            .extend_from_slice(blockers);
        true
    }

    /// Removes the edges a granted waiter added.
    pub(crate) fn stop_waiting(&mut self, waiter: TxnId, blockers: &[TxnId]) {
        let Entry::Occupied(mut entry) = self.edges.entry(waiter) else {
            return;
        };
        let edges = entry.get_mut();
        for blocker in blockers {
            if let Some(pos) = edges.iter().position(|e| e == blocker) {
                edges.swap_remove(pos);
            }
        }
        if edges.is_empty() {
            entry.remove();
        }
    }

    fn reaches(&self, from: TxnId, to: TxnId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(tid) = stack.pop() {
            if tid == to {
                return true;
            }
            if seen.insert(tid) {
                if let Some(next) = self.edges.get(&tid) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        false
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

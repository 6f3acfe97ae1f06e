use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::error::ErrorClass;

/// Receives one call per finalized transaction.
pub trait StatsSink<K>: Send + Sync {
    fn inc_attempted(&self, trx_type: K);
    fn inc_committed(&self, trx_type: K);
    fn inc_aborted(&self, trx_type: K, class: ErrorClass);
}

#[derive(Debug, Default)]
struct Counters {
    attempted: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    user_aborts: AtomicU64,
}

/// Snapshot of the counters of one transaction type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrxCounters {
    pub attempted: u64,
    pub committed: u64,
    pub aborted: u64,
    /// Aborts caused by the input data, a subset of `aborted`.
    pub user_aborts: u64,
}

impl TrxCounters {
    fn add(&mut self, other: &TrxCounters) {
        self.attempted += other.attempted;
        self.committed += other.committed;
        self.aborted += other.aborted;
        self.user_aborts += other.user_aborts;
    }
}

/// Per-transaction-type counters kept in memory.
#[derive(Debug)]
pub struct TrxStats<K: Eq + Hash> {
    counters: DashMap<K, Counters>,
}

impl<K: Eq + Hash + Copy> TrxStats<K> {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    fn bump(&self, trx_type: K, f: impl FnOnce(&Counters)) {
        f(&self.counters.entry(trx_type).or_default());
    }

    pub fn get(&self, trx_type: K) -> TrxCounters {
        self.counters
            .get(&trx_type)
            .map(|c| snapshot(&c))
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<(K, TrxCounters)> {
        self.counters
            .iter()
            .map(|entry| (*entry.key(), snapshot(entry.value())))
            .collect()
    }

    pub fn totals(&self) -> TrxCounters {
        let mut total = TrxCounters::default();
        for entry in self.counters.iter() {
            total.add(&snapshot(entry.value()));
        }
        total
    }

    pub fn reset(&self) {
        self.counters.clear();
    }
}

impl<K: Eq + Hash + Copy> Default for TrxStats<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot(c: &Counters) -> TrxCounters {
    TrxCounters {
        attempted: c.attempted.load(Ordering::Relaxed),
        committed: c.committed.load(Ordering::Relaxed),
        aborted: c.aborted.load(Ordering::Relaxed),
        user_aborts: c.user_aborts.load(Ordering::Relaxed),
    }
}

impl<K: Eq + Hash + Copy + Send + Sync> StatsSink<K> for TrxStats<K> {
    fn inc_attempted(&self, trx_type: K) {
        self.bump(trx_type, |c| {
            c.attempted.fetch_add(1, Ordering::Relaxed);
        });
    }

    fn inc_committed(&self, trx_type: K) {
        self.bump(trx_type, |c| {
            c.committed.fetch_add(1, Ordering::Relaxed);
        });
    }

    fn inc_aborted(&self, trx_type: K, class: ErrorClass) {
        self.bump(trx_type, |c| {
            c.aborted.fetch_add(1, Ordering::Relaxed);
            if class == ErrorClass::UserData {
                c.user_aborts.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = TrxStats::new();
        stats.inc_attempted("a");
        stats.inc_committed("a");
        stats.inc_attempted("a");
        stats.inc_aborted("a", ErrorClass::UserData);
        stats.inc_attempted("b");
        stats.inc_aborted("b", ErrorClass::Storage);
        assert_eq!(stats.get("a"), TrxCounters {
            attempted: 2,
            committed: 1,
            aborted: 1,
            user_aborts: 1,
        });
        assert_eq!(stats.get("c"), TrxCounters::default());
        let total = stats.totals();
        assert_eq!(total.attempted, 3);
        assert_eq!(total.aborted, 2);
        assert_eq!(total.user_aborts, 1);
    }
}

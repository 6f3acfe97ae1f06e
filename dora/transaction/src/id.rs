//! Transaction identifiers and commit timestamps.
//!
//! Ids are handed out by generator values owned by a transaction manager, so
//! two engines in the same process never share a counter.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{TransactionError, TransactionResult};

/// Identifier of one logical transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TxnId(u64);

impl TxnId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Position of a committed transaction in the global commit order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct CommitTs(u64);

impl CommitTs {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Monotonic counter shared by both generators.
#[derive(Debug)]
struct Sequence {
    counter: AtomicU64,
}

impl Sequence {
    fn starting_at(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }

    /// Returns the next value, or the reached value when the counter is exhausted.
    fn next(&self) -> Result<u64, u64> {
        let mut cur = self.counter.load(Ordering::Relaxed);
        loop {
            if cur == u64::MAX {
                return Err(cur);
            }
            match self.counter.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(cur),
                Err(actual) => cur = actual,
            }
        }
    }

    fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

/// Hands out transaction ids starting from 1.
#[derive(Debug)]
pub struct TxnIdGenerator {
    seq: Sequence,
}

impl TxnIdGenerator {
    pub fn new() -> Self {
        Self::with_start(1)
    }

    pub fn with_start(start: u64) -> Self {
        Self {
            seq: Sequence::starting_at(start),
        }
    }

    pub fn next(&self) -> TransactionResult<TxnId> {
        self.seq
            .next()
            .map(TxnId)
            .map_err(TransactionError::TxnIdOverflow)
    }

    /// The id the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> TxnId {
        TxnId(self.seq.current())
    }
}

impl Default for TxnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out commit timestamps starting from 1.
#[derive(Debug)]
pub struct CommitTsGenerator {
    seq: Sequence,
}

impl CommitTsGenerator {
    pub fn new() -> Self {
        Self {
            seq: Sequence::starting_at(1),
        }
    }

    pub fn next(&self) -> TransactionResult<CommitTs> {
        self.seq
            .next()
            .map(CommitTs)
            .map_err(TransactionError::CommitTsOverflow)
    }

    /// The latest timestamp handed out, or zero if none was.
    pub fn latest(&self) -> CommitTs {
        CommitTs(self.seq.current() - 1)
    }
}

impl Default for CommitTsGenerator {
    fn default() -> Self {
        Self::new()
    }
}

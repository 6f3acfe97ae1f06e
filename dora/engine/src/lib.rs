//! Data-oriented transaction execution.
//!
//! Every table is split into key-range partitions and each partition is owned
//! by exactly one worker thread. A transaction is a chain of phases: each
//! phase is a set of single-partition [`Action`]s that report to one
//! rendezvous point ([`Rvp`]). The last action to finish fires the rendezvous
//! point, which either enqueues the next phase or commits/aborts the
//! transaction and signals the submitter.
//!
//! A workload plugs into the engine through [`Workload`], naming its closed
//! set of action bodies and phase-carried data.

use std::fmt::{Debug, Display};
use std::hash::Hash;

pub mod action;
pub mod cache;
pub mod config;
pub mod engine;
pub mod enqueue;
pub mod error;
pub mod key;
pub mod lock;
pub mod part_table;
pub mod partition;
pub mod rvp;
pub mod stats;
pub mod txn;

pub use action::{Action, ActionBody, ActionContext};
pub use cache::{CacheStats, Cacheable, ObjectCache, Pooled};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use enqueue::{Forward, Wave};
pub use error::{EngineError, EngineResult, EnqueueError, ErrorClass, TrxError};
pub use key::{ActionKeys, Key};
pub use lock::LockMode;
pub use part_table::{PartTable, TableId, TableSpec};
pub use partition::{Partition, PartitionStats};
pub use rvp::{PhaseBody, Rvp, RvpId};
pub use stats::{StatsSink, TrxCounters, TrxStats};
pub use txn::{Admission, TrxHandle, TrxResult, TrxStatus, TxnBuilder, TxnContext};

/// A family of transactions executed by one engine.
pub trait Workload: Debug + Sized + Send + Sync + 'static {
    /// Transaction kinds, used for statistics.
    type TrxType: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;
    /// Tables and indexes the actions operate on.
    type Db: Send + Sync + 'static;
    /// The closed set of action bodies.
    type Body: ActionBody<Self>;
    /// Data carried from one phase of a transaction to the next.
    type Phase: PhaseBody<Self>;
    /// Result payload of a committed transaction.
    type Output: Default + Debug + Send + 'static;
}

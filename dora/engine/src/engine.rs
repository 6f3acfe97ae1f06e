use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dora_storage::MemTxnManager;
use dora_transaction::TxnManager;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::Workload;
use crate::action::Action;
use crate::cache::{CacheStats, ObjectCache};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, EnqueueError};
use crate::key::Key;
use crate::lock::WaitGraph;
use crate::part_table::{PartTable, TableId, TableSpec};
use crate::partition::{Partition, PartitionStats};
use crate::rvp::Rvp;
use crate::stats::{StatsSink, TrxStats};
use crate::txn::TxnBuilder;

pub(crate) struct EngineInner<W: Workload> {
    pub(crate) db: W::Db,
    pub(crate) config: EngineConfig,
    pub(crate) tables: RwLock<Vec<Arc<PartTable<W>>>>,
    pub(crate) actions: Arc<ObjectCache<Action<W>>>,
    pub(crate) rvps: Arc<ObjectCache<Rvp<W>>>,
    pub(crate) txn_manager: MemTxnManager,
    pub(crate) sink: Arc<dyn StatsSink<W::TrxType>>,
    /// Lock waits of every partition, checked for cycles.
    pub(crate) waits: Mutex<WaitGraph>,
    /// Serializes start, stop and repartition.
    lifecycle: Mutex<()>,
    running: AtomicBool,
}

impl<W: Workload> EngineInner<W> {
    fn partitions(&self) -> Vec<Arc<Partition<W>>> {
        self.tables
            .read()
            .iter()
            .flat_map(|t| t.partitions().iter().cloned())
            .collect()
    }

    fn start_workers(&self) -> EngineResult<()> {
        for part in self.partitions() {
            part.start()?;
        }
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop_workers(&self) {
        let parts = self.partitions();
        for part in &parts {
            part.close();
        }
        for part in &parts {
            part.join();
        }
        self.running.store(false, Ordering::Release);
    }
}

pub struct EngineBuilder<W: Workload> {
    db: W::Db,
    config: EngineConfig,
    specs: Vec<TableSpec>,
    sink: Option<Arc<dyn StatsSink<W::TrxType>>>,
}

impl<W: Workload> EngineBuilder<W> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the next table. Tables get ids in registration order.
    pub fn table(mut self, spec: TableSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn stats_sink(mut self, sink: Arc<dyn StatsSink<W::TrxType>>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Creates every partition and starts its worker.
    pub fn build(self) -> EngineResult<Engine<W>> {
        let EngineBuilder {
            db,
            config,
            specs,
            sink,
        } = self;
        if specs.is_empty() {
            return Err(EngineError::InvalidConfig("no tables registered".into()));
        }
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(EngineError::InvalidConfig(format!(
                    "table {} registered twice",
                    spec.name
                )));
            }
        }
        let tables = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| PartTable::new(TableId(i), spec, &config).map(Arc::new))
            .collect::<EngineResult<Vec<_>>>()?;
        let inner = Arc::new(EngineInner {
            db,
            actions: ObjectCache::new("action", config.cache_shards, config.cache_init_count),
            rvps: ObjectCache::new("rvp", config.cache_shards, config.cache_init_count),
            config,
            tables: RwLock::new(tables),
            txn_manager: MemTxnManager::new(),
            sink: sink.unwrap_or_else(|| Arc::new(TrxStats::<W::TrxType>::new())),
            waits: Mutex::new(WaitGraph::default()),
            lifecycle: Mutex::new(()),
            running: AtomicBool::new(false),
        });
        let engine = Engine { inner };
        engine.start()?;
        Ok(engine)
    }
}

/// A running set of partitioned tables and their workers.
///
/// Dropping the engine stops it: queued actions are drained first.
pub struct Engine<W: Workload> {
    inner: Arc<EngineInner<W>>,
}

impl<W: Workload> Engine<W> {
    pub fn builder(db: W::Db) -> EngineBuilder<W> {
        EngineBuilder {
            db,
            config: EngineConfig::default(),
            specs: Vec::new(),
            sink: None,
        }
    }

    pub fn db(&self) -> &W::Db {
        &self.inner.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn txn_manager(&self) -> &MemTxnManager {
        &self.inner.txn_manager
    }

    /// Starts declaring a new transaction of type `trx_type`.
    pub fn admit(&self, trx_type: W::TrxType) -> TxnBuilder<W> {
        TxnBuilder::new(self.inner.clone(), trx_type)
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.inner
            .tables
            .read()
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.id())
    }

    pub fn table_specs(&self) -> Vec<TableSpec> {
        self.inner
            .tables
            .read()
            .iter()
            .map(|t| t.spec().clone())
            .collect()
    }

    /// Partition index `key` is routed to in `table`.
    pub fn route(&self, table: TableId, key: &Key) -> Result<usize, EnqueueError> {
        let tables = self.inner.tables.read();
        let table = tables.get(table.0).ok_or(EnqueueError::UnknownTable(table.0))?;
        table.route(key)
    }

    pub fn partition_count(&self, table: TableId) -> Option<usize> {
        self.inner.tables.read().get(table.0).map(|t| t.len())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Opens every queue and spawns the workers that are not running.
    pub fn start(&self) -> EngineResult<()> {
        let _lifecycle = self.inner.lifecycle.lock();
        self.inner.start_workers()?;
        info!(
            partitions = self.inner.partitions().len(),
            "engine started"
        );
        Ok(())
    }

    /// Closes every queue, lets the workers drain what is queued and joins
    /// them. Phases built while draining fail to enqueue and abort their
    /// transactions.
    pub fn stop(&self) {
        let _lifecycle = self.inner.lifecycle.lock();
        if !self.is_running() {
            return;
        }
        self.inner.stop_workers();
        if !self.inner.waits.lock().is_empty() {
            warn!("lock waits recorded after every worker drained");
        }
        info!("engine stopped");
    }

    /// Changes the partition count of `table`: stop, rebuild, restart.
    pub fn repartition(&self, table: TableId, partitions: usize) -> EngineResult<()> {
        let _lifecycle = self.inner.lifecycle.lock();
        let mut spec = {
            let tables = self.inner.tables.read();
            let current = tables
                .get(table.0)
                .ok_or_else(|| EngineError::UnknownTable(format!("#{}", table.0)))?;
            current.spec().clone()
        };
        spec.partitions = partitions;
        let rebuilt = Arc::new(PartTable::new(table, spec, &self.inner.config)?);
        self.inner.stop_workers();
        info!(table = %rebuilt.name(), partitions = rebuilt.len(), "repartitioning");
        self.inner.tables.write()[table.0] = rebuilt;
        self.inner.start_workers()
    }

    pub fn partition_stats(&self) -> Vec<PartitionStats> {
        self.inner.partitions().iter().map(|p| p.stats()).collect()
    }

    pub fn action_cache_stats(&self) -> CacheStats {
        self.inner.actions.stats()
    }

    pub fn rvp_cache_stats(&self) -> CacheStats {
        self.inner.rvps.stats()
    }
}

impl<W: Workload> Drop for Engine<W> {
    fn drop(&mut self) {
        self.stop();
        let in_flight = self.inner.txn_manager.active_count();
        if in_flight > 0 {
            warn!(in_flight, "engine dropped with unfinished transactions");
        }
    }
}

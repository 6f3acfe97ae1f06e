use std::sync::Arc;

use dora_engine::{Engine, EngineBuilder, TrxHandle, TrxResult, TrxStats};
use tracing::info;

use crate::config::TpccConfig;
use crate::error::TpccResult;
use crate::input::TrxRequest;
use crate::schema::{TpccDb, TpccTable};
use crate::workload::{Tpcc, TrxType};
use crate::{loader, mbench, new_order, order_status, payment, stock_level};

/// A loaded TPC-C database served by a running engine.
pub struct DoraTpcc {
    engine: Engine<Tpcc>,
    stats: Arc<TrxStats<TrxType>>,
    config: TpccConfig,
}

impl DoraTpcc {
    /// Generates the database described by `config` and starts the workers.
    pub fn new(config: TpccConfig) -> TpccResult<Self> {
        config.scale.validate()?;
        let db = loader::load(&config.scale)?;
        Self::with_db(config, db)
    }

    /// Serves an already populated database.
    pub fn with_db(config: TpccConfig, db: TpccDb) -> TpccResult<Self> {
        config.scale.validate()?;
        let stats = Arc::new(TrxStats::new());
        let builder = TpccTable::specs(&config.scale, &config.partitions)
            .into_iter()
            .fold(Engine::builder(db), EngineBuilder::table);
        let engine = builder
            .config(config.engine.clone())
            .stats_sink(stats.clone())
            .build()?;
        info!(
            warehouses = config.scale.warehouses,
            partitions = engine.table_specs().iter().map(|s| s.partitions).sum::<usize>(),
            "tpcc environment ready"
        );
        Ok(Self {
            engine,
            stats,
            config,
        })
    }

    /// Submits one transaction and blocks until it committed or aborted.
    pub fn submit(&self, request: TrxRequest) -> TpccResult<TrxResult<Tpcc>> {
        Ok(self.submit_nowait(request)?.wait())
    }

    /// Submits one transaction and returns a handle to wait on.
    pub fn submit_nowait(&self, request: TrxRequest) -> TpccResult<TrxHandle<Tpcc>> {
        let engine = &self.engine;
        let handle = match request {
            TrxRequest::NewOrder(input) => new_order::submit(engine, input),
            TrxRequest::Payment(input) => payment::submit(engine, input),
            TrxRequest::OrderStatus(input) => order_status::submit(engine, input),
            TrxRequest::StockLevel(input) => stock_level::submit(engine, input),
            TrxRequest::Mbench(input) => mbench::submit(engine, input),
        }?;
        Ok(handle)
    }

    pub fn engine(&self) -> &Engine<Tpcc> {
        &self.engine
    }

    pub fn db(&self) -> &TpccDb {
        self.engine.db()
    }

    pub fn stats(&self) -> &TrxStats<TrxType> {
        &self.stats
    }

    pub fn config(&self) -> &TpccConfig {
        &self.config
    }

    /// Drains and joins every worker. Later submissions abort.
    pub fn stop(&self) {
        self.engine.stop();
    }
}

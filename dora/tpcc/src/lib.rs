//! TPC-C on the DORA engine.
//!
//! New-Order, Payment, Order-Status, Stock-Level and two single-row
//! micro-benchmarks, each expressed as a fixed chain of action waves
//! separated by rendezvous points.

pub mod config;
pub mod env;
pub mod error;
pub mod input;
pub mod loader;
pub mod mbench;
pub mod new_order;
pub mod order_status;
pub mod payment;
pub mod schema;
pub mod stock_level;
pub mod workload;

pub use config::{PartitionConfig, ScaleConfig, TpccConfig};
pub use env::DoraTpcc;
pub use error::{TpccError, TpccResult};
pub use input::{
    CustomerSelector, InputGenerator, MbenchInput, Mix, NewOrderInput, OrderLineInput,
    OrderStatusInput, PaymentInput, StockLevelInput, TrxRequest,
};
pub use schema::{TpccDb, TpccTable};
pub use workload::{Tpcc, TpccOutput, TrxType};

/// Result of one submitted TPC-C transaction.
pub type TpccTrxResult = dora_engine::TrxResult<Tpcc>;

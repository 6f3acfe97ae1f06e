use dora_engine::{EngineConfig, TrxError};
use dora_tpcc::{
    CustomerSelector, DoraTpcc, NewOrderInput, OrderLineInput, PartitionConfig, PaymentInput,
    ScaleConfig, TpccConfig, TpccTrxResult, TrxRequest,
};

/// A small database with every table split into `partitions` partitions.
pub fn create_env(partitions: usize) -> DoraTpcc {
    create_env_with(ScaleConfig::small(), partitions)
}

pub fn create_env_with(scale: ScaleConfig, partitions: usize) -> DoraTpcc {
    let config = TpccConfig {
        scale,
        partitions: PartitionConfig::uniform(partitions),
        engine: EngineConfig::default(),
    };
    DoraTpcc::new(config).unwrap()
}

/// (i_id, supply_w_id, quantity)
pub fn new_order(w_id: i32, d_id: i32, c_id: i32, lines: &[(i32, i32, i32)]) -> TrxRequest {
    TrxRequest::NewOrder(NewOrderInput {
        w_id,
        d_id,
        c_id,
        lines: lines
            .iter()
            .map(|&(i_id, supply_w_id, quantity)| OrderLineInput {
                i_id,
                supply_w_id,
                quantity,
            })
            .collect(),
        entry_d: 1,
    })
}

pub fn payment(w_id: i32, d_id: i32, customer: CustomerSelector, amount: f64) -> TrxRequest {
    TrxRequest::Payment(PaymentInput {
        w_id,
        d_id,
        c_w_id: w_id,
        c_d_id: d_id,
        customer,
        amount,
        date: 1,
    })
}

pub fn expect_committed(result: &TpccTrxResult) {
    assert!(
        result.is_committed(),
        "{} aborted: {:?}",
        result.trx_type,
        result.error()
    );
}

pub fn expect_aborted(result: &TpccTrxResult) -> TrxError {
    result
        .error()
        .cloned()
        .unwrap_or_else(|| panic!("{} committed", result.trx_type))
}

//! Single-action micro-benchmarks.

use dora_engine::{
    ActionBody, ActionContext, ActionKeys, Engine, EngineResult, TableId, TrxError, TrxHandle,
};

use crate::input::MbenchInput;
use crate::schema::TpccTable;
use crate::workload::{Tpcc, TpccPhase, TrxType};

#[derive(Debug)]
pub struct MbenchAction(MbenchInput);

impl ActionBody<Tpcc> for MbenchAction {
    fn table(&self) -> TableId {
        match self.0 {
            MbenchInput::Warehouse { .. } => TpccTable::Warehouse.id(),
            MbenchInput::Customer { .. } => TpccTable::Customer.id(),
        }
    }

    fn calc_keys(&self) -> ActionKeys {
        match self.0 {
            MbenchInput::Warehouse { w_id, .. } => ActionKeys::point([w_id]),
            MbenchInput::Customer { w_id, d_id, c_id, .. } => {
                ActionKeys::point([w_id, d_id, c_id])
            }
        }
    }

    fn execute(&mut self, cx: &ActionContext<'_, Tpcc>) -> Result<(), TrxError> {
        let db = cx.db();
        let txn = cx.xct_for_update()?;
        let value = match self.0 {
            MbenchInput::Warehouse { w_id, amount } => db.warehouse.modify(txn, &w_id, |w| {
                w.ytd += amount;
                w.ytd
            })?,
            MbenchInput::Customer {
                w_id,
                d_id,
                c_id,
                amount,
            } => db.customer.modify(txn, &(w_id, d_id, c_id), |c| {
                c.balance -= amount;
                c.ytd_payment += amount;
                c.balance
            })?,
        };
        *cx.phase() = TpccPhase::Mbench(value);
        Ok(())
    }
}

pub(crate) fn submit(engine: &Engine<Tpcc>, input: MbenchInput) -> EngineResult<TrxHandle<Tpcc>> {
    let trx_type = match input {
        MbenchInput::Warehouse { .. } => TrxType::MbenchWh,
        MbenchInput::Customer { .. } => TrxType::MbenchCust,
    };
    let admission = engine
        .admit(trx_type)
        .terminal(1, TpccPhase::Empty)?;
    let mut wave = admission.wave();
    wave.push(MbenchAction(input).into());
    wave.enqueue();
    Ok(admission.into_handle())
}

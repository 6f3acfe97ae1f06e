//! Order-Status: two reads reporting straight to the terminal RVP.
//!
//! The customer and their most recent order are resolved by the submitting
//! thread. When either is missing nothing is enqueued and the transaction
//! aborts from the dispatcher.

use dora_engine::{
    ActionBody, ActionContext, ActionKeys, Engine, EngineResult, TableId, TrxError, TrxHandle,
};

use crate::input::OrderStatusInput;
use crate::payment::select_customer;
use crate::schema::{OrderLine, TpccDb, TpccTable};
use crate::workload::{Tpcc, TpccOutput, TpccPhase, TrxType};

#[derive(Debug, Default)]
pub struct OrderStatusPhase {
    c_id: i32,
    o_id: i32,
    carrier_id: Option<i32>,
    balance: f64,
    lines: Vec<OrderLine>,
}

impl OrderStatusPhase {
    pub(crate) fn output(&mut self) -> TpccOutput {
        TpccOutput::OrderStatus {
            c_id: self.c_id,
            balance: self.balance,
            o_id: self.o_id,
            carrier_id: self.carrier_id,
            lines: std::mem::take(&mut self.lines),
        }
    }
}

#[derive(Debug)]
pub enum OrderStatusAction {
    Customer { w_id: i32, d_id: i32, c_id: i32 },
    Lines { w_id: i32, d_id: i32, o_id: i32 },
}

impl ActionBody<Tpcc> for OrderStatusAction {
    fn table(&self) -> TableId {
        match self {
            OrderStatusAction::Customer { .. } => TpccTable::Customer.id(),
            OrderStatusAction::Lines { .. } => TpccTable::OrderLine.id(),
        }
    }

    fn calc_keys(&self) -> ActionKeys {
        match *self {
            OrderStatusAction::Customer { w_id, d_id, c_id } => {
                ActionKeys::point([w_id, d_id, c_id])
            }
            OrderStatusAction::Lines { w_id, d_id, o_id } => ActionKeys::point([w_id, d_id, o_id]),
        }
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn execute(&mut self, cx: &ActionContext<'_, Tpcc>) -> Result<(), TrxError> {
        let db = cx.db();
        match *self {
            OrderStatusAction::Customer { w_id, d_id, c_id } => {
                let customer = db.customer.lookup(&(w_id, d_id, c_id))?;
                cx.phase().order_status()?.balance = customer.balance;
            }
            OrderStatusAction::Lines { w_id, d_id, o_id } => {
                let lines = db.lines_of(w_id, d_id, o_id);
                cx.phase().order_status()?.lines = lines;
            }
        }
        Ok(())
    }
}

/// Customer id, last order id and its carrier.
fn resolve(db: &TpccDb, input: &OrderStatusInput) -> Result<(i32, i32, Option<i32>), TrxError> {
    let (w_id, d_id) = (input.w_id, input.d_id);
    let c_id = select_customer(db, w_id, d_id, &input.customer)?;
    let o_id = db.last_order_of(w_id, d_id, c_id).ok_or_else(|| {
        TrxError::not_found("order", format!("of customer ({w_id},{d_id},{c_id})"))
    })?;
    let order = db.order.lookup(&(w_id, d_id, o_id))?;
    Ok((c_id, o_id, order.carrier_id))
}

pub(crate) fn submit(
    engine: &Engine<Tpcc>,
    input: OrderStatusInput,
) -> EngineResult<TrxHandle<Tpcc>> {
    let resolved = resolve(engine.db(), &input);
    let phase = match &resolved {
        Ok((c_id, o_id, carrier_id)) => OrderStatusPhase {
            c_id: *c_id,
            o_id: *o_id,
            carrier_id: *carrier_id,
            ..Default::default()
        },
        Err(_) => OrderStatusPhase::default(),
    };
    let admission = engine
        .admit(TrxType::OrderStatus)
        .terminal(2, TpccPhase::OrderStatus(phase))?;
    let (c_id, o_id) = match resolved {
        Ok((c_id, o_id, _)) => (c_id, o_id),
        Err(err) => return Ok(admission.abort(err)),
    };
    let (w_id, d_id) = (input.w_id, input.d_id);
    let mut wave = admission.wave();
    wave.push(OrderStatusAction::Customer { w_id, d_id, c_id }.into())
        .push(OrderStatusAction::Lines { w_id, d_id, o_id }.into());
    wave.enqueue();
    Ok(admission.into_handle())
}

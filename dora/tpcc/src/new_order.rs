//! New-Order: two waves separated by one midway RVP.
//!
//! Wave 1 reads the warehouse and customer, allocates the order id from the
//! district and, per line, reads the item and updates the stock row. Once
//! every line is priced, wave 2 inserts the order, its new-order entry and
//! its lines.

use dora_engine::{
    ActionBody, ActionContext, ActionKeys, Engine, EngineResult, Forward, TableId, TrxError,
    TrxHandle,
};
use smol_str::SmolStr;
use tracing::trace;

use crate::input::{MAX_OL_CNT, NewOrderInput};
use crate::schema::{NewOrder, Order, OrderLine, TpccTable};
use crate::workload::{Tpcc, TpccOutput, TpccPhase, TrxType};

/// Stock below this level after an order is replenished.
const RESTOCK_THRESHOLD: i32 = 10;
const RESTOCK_AMOUNT: i32 = 91;

/// `S_QUANTITY` after ordering `quantity` units.
pub fn restock(stock: i32, quantity: i32) -> i32 {
    let left = stock - quantity;
    if left >= RESTOCK_THRESHOLD {
        left
    } else {
        left + RESTOCK_AMOUNT
    }
}

/// One line of a committed New-Order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderLineOutput {
    pub i_id: i32,
    pub supply_w_id: i32,
    pub quantity: i32,
    pub stock_quantity: i32,
    pub price: f64,
    pub amount: f64,
    /// `B` when both item and stock data are original, `G` otherwise.
    pub brand: char,
}

#[derive(Debug, Default)]
struct LineState {
    i_id: i32,
    supply_w_id: i32,
    quantity: i32,
    price: Option<f64>,
    item_original: bool,
    stock_quantity: Option<i32>,
    stock_original: bool,
    dist_info: SmolStr,
    amount: f64,
}

/// Values collected by wave 1 and the order built from them.
#[derive(Debug, Default)]
pub struct NewOrderPhase {
    w_id: i32,
    d_id: i32,
    c_id: i32,
    entry_d: u64,
    w_tax: Option<f64>,
    d_tax: f64,
    discount: Option<f64>,
    o_id: Option<i32>,
    lines: Vec<LineState>,
    total: f64,
}

impl NewOrderPhase {
    fn new(input: &NewOrderInput) -> Self {
        Self {
            w_id: input.w_id,
            d_id: input.d_id,
            c_id: input.c_id,
            entry_d: input.entry_d,
            lines: input
                .lines
                .iter()
                .map(|l| LineState {
                    i_id: l.i_id,
                    supply_w_id: l.supply_w_id,
                    quantity: l.quantity,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn line(&mut self, index: usize) -> Result<&mut LineState, TrxError> {
        self.lines
            .get_mut(index)
            .ok_or_else(|| TrxError::Internal(format!("order line {index} does not exist")))
    }

    pub(crate) fn forward(&mut self, next: &mut Forward<'_, Tpcc>) -> Result<(), TrxError> {
        let missing =
            |what: &str| TrxError::Internal(format!("new-order wave 1 left no {what}"));
        let o_id = self.o_id.ok_or_else(|| missing("order id"))?;
        let w_tax = self.w_tax.ok_or_else(|| missing("warehouse tax"))?;
        let discount = self.discount.ok_or_else(|| missing("customer discount"))?;

        let mut sum = 0.0;
        for line in &mut self.lines {
            let price = line.price.ok_or_else(|| missing("item price"))?;
            line.amount = f64::from(line.quantity) * price;
            sum += line.amount;
        }
        self.total = sum * (1.0 - discount) * (1.0 + w_tax + self.d_tax);

        let (w_id, d_id) = (self.w_id, self.d_id);
        next.push(
            NewOrderAction::InsertOrder {
                order: Order {
                    o_id,
                    d_id,
                    w_id,
                    c_id: self.c_id,
                    entry_d: self.entry_d,
                    carrier_id: None,
                    ol_cnt: self.lines.len() as i32,
                    all_local: self.lines.iter().all(|l| l.supply_w_id == w_id),
                },
            }
            .into(),
        );
        next.push(NewOrderAction::InsertNewOrder { w_id, d_id, o_id }.into());
        for (number, line) in (1..).zip(&self.lines) {
            next.push(
                NewOrderAction::InsertLine {
                    line: OrderLine {
                        o_id,
                        d_id,
                        w_id,
                        number,
                        i_id: line.i_id,
                        supply_w_id: line.supply_w_id,
                        delivery_d: None,
                        quantity: line.quantity,
                        amount: line.amount,
                        dist_info: line.dist_info.clone(),
                    },
                }
                .into(),
            );
        }
        *next.next_phase() = TpccPhase::NewOrder(std::mem::take(self));
        Ok(())
    }

    pub(crate) fn output(&mut self) -> TpccOutput {
        TpccOutput::NewOrder {
            o_id: self.o_id.unwrap_or_default(),
            total: self.total,
            lines: self
                .lines
                .iter()
                .map(|l| NewOrderLineOutput {
                    i_id: l.i_id,
                    supply_w_id: l.supply_w_id,
                    quantity: l.quantity,
                    stock_quantity: l.stock_quantity.unwrap_or_default(),
                    price: l.price.unwrap_or_default(),
                    amount: l.amount,
                    brand: if l.item_original && l.stock_original {
                        'B'
                    } else {
                        'G'
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub enum NewOrderAction {
    Warehouse {
        w_id: i32,
    },
    Customer {
        w_id: i32,
        d_id: i32,
        c_id: i32,
    },
    District {
        w_id: i32,
        d_id: i32,
    },
    Item {
        line: usize,
        i_id: i32,
    },
    Stock {
        line: usize,
        w_id: i32,
        d_id: i32,
        supply_w_id: i32,
        i_id: i32,
        quantity: i32,
    },
    InsertOrder {
        order: Order,
    },
    InsertNewOrder {
        w_id: i32,
        d_id: i32,
        o_id: i32,
    },
    InsertLine {
        line: OrderLine,
    },
}

impl ActionBody<Tpcc> for NewOrderAction {
    fn table(&self) -> TableId {
        match self {
            NewOrderAction::Warehouse { .. } => TpccTable::Warehouse,
            NewOrderAction::Customer { .. } => TpccTable::Customer,
            NewOrderAction::District { .. } => TpccTable::District,
            NewOrderAction::Item { .. } => TpccTable::Item,
            NewOrderAction::Stock { .. } => TpccTable::Stock,
            NewOrderAction::InsertOrder { .. } => TpccTable::Order,
            NewOrderAction::InsertNewOrder { .. } => TpccTable::NewOrder,
            NewOrderAction::InsertLine { .. } => TpccTable::OrderLine,
        }
        .id()
    }

    fn calc_keys(&self) -> ActionKeys {
        match self {
            NewOrderAction::Warehouse { w_id } => ActionKeys::point([*w_id]),
            NewOrderAction::Customer { w_id, d_id, c_id } => {
                ActionKeys::point([*w_id, *d_id, *c_id])
            }
            NewOrderAction::District { w_id, d_id } => ActionKeys::point([*w_id, *d_id]),
            NewOrderAction::Item { i_id, .. } => ActionKeys::point([*i_id]),
            NewOrderAction::Stock {
                supply_w_id, i_id, ..
            } => ActionKeys::point([*supply_w_id, *i_id]),
            NewOrderAction::InsertOrder { order } => {
                ActionKeys::point([order.w_id, order.d_id, order.o_id])
            }
            NewOrderAction::InsertNewOrder { w_id, d_id, o_id } => {
                ActionKeys::point([*w_id, *d_id, *o_id])
            }
            NewOrderAction::InsertLine { line } => {
                ActionKeys::point([line.w_id, line.d_id, line.o_id, line.number])
            }
        }
    }

    fn is_read_only(&self) -> bool {
        matches!(
            self,
            NewOrderAction::Warehouse { .. }
                | NewOrderAction::Customer { .. }
                | NewOrderAction::Item { .. }
        )
    }

    fn execute(&mut self, cx: &ActionContext<'_, Tpcc>) -> Result<(), TrxError> {
        let db = cx.db();
        match self {
            NewOrderAction::Warehouse { w_id } => {
                let warehouse = db.warehouse.lookup(w_id)?;
                cx.phase().new_order()?.w_tax = Some(warehouse.tax);
            }
            NewOrderAction::Customer { w_id, d_id, c_id } => {
                let customer = db.customer.lookup(&(*w_id, *d_id, *c_id))?;
                cx.phase().new_order()?.discount = Some(customer.discount);
            }
            NewOrderAction::District { w_id, d_id } => {
                let (o_id, tax) = db.district.modify(
                    cx.xct_for_update()?,
                    &(*w_id, *d_id),
                    |district| {
                        let o_id = district.next_o_id;
                        district.next_o_id += 1;
                        (o_id, district.tax)
                    },
                )?;
                trace!(
                    txn = %cx.txn_id(),
                    w_id = *w_id,
                    d_id = *d_id,
                    o_id,
                    "order id allocated"
                );
                let mut phase = cx.phase();
                let phase = phase.new_order()?;
                phase.o_id = Some(o_id);
                phase.d_tax = tax;
            }
            NewOrderAction::Item { line, i_id } => {
                let item = db.item.lookup(i_id).map_err(|err| {
                    if err.is_not_found() {
                        TrxError::not_found("item", *i_id)
                    } else {
                        err.into()
                    }
                })?;
                let mut phase = cx.phase();
                let state = phase.new_order()?.line(*line)?;
                state.price = Some(item.price);
                state.item_original = item.data.contains("ORIGINAL");
            }
            NewOrderAction::Stock {
                line,
                w_id,
                d_id,
                supply_w_id,
                i_id,
                quantity,
            } => {
                let remote = supply_w_id != w_id;
                let (stock_quantity, original, dist_info) = db.stock.modify(
                    cx.xct_for_update()?,
                    &(*supply_w_id, *i_id),
                    |stock| {
                        stock.quantity = restock(stock.quantity, *quantity);
                        stock.ytd += *quantity;
                        stock.order_cnt += 1;
                        if remote {
                            stock.remote_cnt += 1;
                        }
                        (
                            stock.quantity,
                            stock.data.contains("ORIGINAL"),
                            stock.dist_info(*d_id),
                        )
                    },
                )?;
                let mut phase = cx.phase();
                let state = phase.new_order()?.line(*line)?;
                state.stock_quantity = Some(stock_quantity);
                state.stock_original = original;
                state.dist_info = dist_info;
            }
            NewOrderAction::InsertOrder { order } => {
                let txn = cx.xct_for_update()?;
                let (w_id, d_id, o_id) = (order.w_id, order.d_id, order.o_id);
                db.order.insert(txn, (w_id, d_id, o_id), order.clone())?;
                // Order-Status finds orders through the index; the row must
                // already be there.
                db.order_by_customer
                    .insert(txn, (w_id, d_id, order.c_id, o_id), ())?;
            }
            NewOrderAction::InsertNewOrder { w_id, d_id, o_id } => {
                db.new_order
                    .insert(cx.xct_for_update()?, (*w_id, *d_id, *o_id), NewOrder)?;
            }
            NewOrderAction::InsertLine { line } => {
                let key = (line.w_id, line.d_id, line.o_id, line.number);
                db.order_line
                    .insert(cx.xct_for_update()?, key, line.clone())?;
            }
        }
        Ok(())
    }
}

fn validate(input: &NewOrderInput, items: i32) -> Result<(), TrxError> {
    if input.lines.is_empty() || input.lines.len() > MAX_OL_CNT {
        return Err(TrxError::InvalidInput(format!(
            "a new order needs 1 to {MAX_OL_CNT} lines, got {}",
            input.lines.len()
        )));
    }
    if let Some(line) = input.lines.iter().find(|l| l.quantity <= 0) {
        return Err(TrxError::InvalidInput(format!(
            "quantity {} of item {} is not positive",
            line.quantity, line.i_id
        )));
    }
    // Unknown items are the TPC-C rollback path. They cannot be routed, so
    // the dispatcher turns them into a user abort.
    if let Some(line) = input.lines.iter().find(|l| !(1..=items).contains(&l.i_id)) {
        return Err(TrxError::not_found("item", line.i_id));
    }
    Ok(())
}

pub(crate) fn submit(
    engine: &Engine<Tpcc>,
    input: NewOrderInput,
) -> EngineResult<TrxHandle<Tpcc>> {
    let n = input.lines.len();
    let admission = engine
        .admit(TrxType::NewOrder)
        .midway(3 + 2 * n, TpccPhase::NewOrder(NewOrderPhase::new(&input)))
        .terminal(2 + n, TpccPhase::Empty)?;
    if let Err(err) = validate(&input, engine.db().scale.items) {
        return Ok(admission.abort(err));
    }

    let NewOrderInput {
        w_id,
        d_id,
        c_id,
        lines,
        ..
    } = input;
    let mut wave = admission.wave();
    wave.push(NewOrderAction::Warehouse { w_id }.into())
        .push(NewOrderAction::Customer { w_id, d_id, c_id }.into())
        .push(NewOrderAction::District { w_id, d_id }.into());
    for (line, l) in lines.into_iter().enumerate() {
        wave.push(NewOrderAction::Item { line, i_id: l.i_id }.into())
            .push(
                NewOrderAction::Stock {
                    line,
                    w_id,
                    d_id,
                    supply_w_id: l.supply_w_id,
                    i_id: l.i_id,
                    quantity: l.quantity,
                }
                .into(),
            );
    }
    wave.enqueue();
    Ok(admission.into_handle())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::OrderLineInput;

    #[test]
    fn test_restock() {
        assert_eq!(restock(50, 5), 45);
        assert_eq!(restock(15, 5), 10);
        assert_eq!(restock(14, 5), 100);
        assert_eq!(restock(7, 2), 96);
    }

    #[test]
    fn test_validate() {
        let line = OrderLineInput {
            i_id: 1,
            supply_w_id: 1,
            quantity: 1,
        };
        let mut input = NewOrderInput {
            w_id: 1,
            d_id: 1,
            c_id: 1,
            lines: vec![line; 3],
            entry_d: 0,
        };
        assert!(validate(&input, 10).is_ok());
        input.lines[2].i_id = 11;
        assert_eq!(validate(&input, 10), Err(TrxError::not_found("item", 11)));
        input.lines = vec![line; MAX_OL_CNT + 1];
        assert!(matches!(validate(&input, 10), Err(TrxError::InvalidInput(_))));
        input.lines.clear();
        assert!(matches!(validate(&input, 10), Err(TrxError::InvalidInput(_))));
    }
}

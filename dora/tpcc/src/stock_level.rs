//! Stock-Level: three one-action phases.
//!
//! The district's next order id bounds the window of recent orders, their
//! lines give the items sold, and the stock of those items is counted against
//! the threshold.

use dora_engine::{
    ActionBody, ActionContext, ActionKeys, Engine, EngineResult, Forward, TableId, TrxError,
    TrxHandle,
};
use itertools::Itertools;

use crate::input::StockLevelInput;
use crate::schema::TpccTable;
use crate::workload::{Tpcc, TpccOutput, TpccPhase, TrxType};

/// Number of most recent orders examined.
pub const RECENT_ORDERS: i32 = 20;

/// Counts distinct item ids with a quantity below `threshold`.
///
/// `stock` must be sorted by item id; duplicates are skipped by remembering
/// the last counted id.
pub fn count_low_stock(stock: impl IntoIterator<Item = (i32, i32)>, threshold: i32) -> usize {
    let mut last = None;
    let mut count = 0;
    for (i_id, quantity) in stock {
        if quantity < threshold && last != Some(i_id) {
            count += 1;
            last = Some(i_id);
        }
    }
    count
}

#[derive(Debug, Default)]
pub struct StockLevelPhase {
    w_id: i32,
    d_id: i32,
    threshold: i32,
    next_o_id: Option<i32>,
    /// (w_id, i_id) pairs in item order, set by the order-line scan.
    items: Option<Vec<(i32, i32)>>,
    low_stock: usize,
}

impl StockLevelPhase {
    pub(crate) fn forward(&mut self, next: &mut Forward<'_, Tpcc>) -> Result<(), TrxError> {
        let (w_id, d_id) = (self.w_id, self.d_id);
        if let Some(items) = self.items.take() {
            next.push(
                StockLevelAction::Stock {
                    w_id,
                    items,
                    threshold: self.threshold,
                }
                .into(),
            );
        } else if let Some(next_o_id) = self.next_o_id {
            next.push(
                StockLevelAction::OrderLines {
                    w_id,
                    d_id,
                    lo: next_o_id - RECENT_ORDERS,
                    hi: next_o_id,
                }
                .into(),
            );
        } else {
            return Err(TrxError::Internal(
                "stock-level phase has neither an order window nor items".into(),
            ));
        }
        *next.next_phase() = TpccPhase::StockLevel(std::mem::take(self));
        Ok(())
    }

    pub(crate) fn output(&mut self) -> TpccOutput {
        TpccOutput::StockLevel {
            low_stock: self.low_stock,
        }
    }
}

#[derive(Debug)]
pub enum StockLevelAction {
    District {
        w_id: i32,
        d_id: i32,
    },
    /// Lines of orders `lo..hi`.
    OrderLines {
        w_id: i32,
        d_id: i32,
        lo: i32,
        hi: i32,
    },
    Stock {
        w_id: i32,
        items: Vec<(i32, i32)>,
        threshold: i32,
    },
}

impl ActionBody<Tpcc> for StockLevelAction {
    fn table(&self) -> TableId {
        match self {
            StockLevelAction::District { .. } => TpccTable::District,
            StockLevelAction::OrderLines { .. } => TpccTable::OrderLine,
            StockLevelAction::Stock { .. } => TpccTable::Stock,
        }
        .id()
    }

    fn calc_keys(&self) -> ActionKeys {
        match self {
            StockLevelAction::District { w_id, d_id } => ActionKeys::point([*w_id, *d_id]),
            StockLevelAction::OrderLines { w_id, d_id, lo, hi } => {
                ActionKeys::range([*w_id, *d_id, *lo], [*w_id, *d_id, *hi])
            }
            StockLevelAction::Stock { w_id, items, .. } => {
                let first = items.first().map_or(0, |(_, i_id)| *i_id);
                let last = items.last().map_or(0, |(_, i_id)| *i_id);
                ActionKeys::range([*w_id, first], [*w_id, last])
            }
        }
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn execute(&mut self, cx: &ActionContext<'_, Tpcc>) -> Result<(), TrxError> {
        let db = cx.db();
        match self {
            StockLevelAction::District { w_id, d_id } => {
                let district = db.district.lookup(&(*w_id, *d_id))?;
                cx.phase().stock_level()?.next_o_id = Some(district.next_o_id);
            }
            StockLevelAction::OrderLines { w_id, d_id, lo, hi } => {
                let (w_id, d_id) = (*w_id, *d_id);
                let items = db
                    .order_line
                    .scan((w_id, d_id, *lo, i32::MIN)..(w_id, d_id, *hi, i32::MIN))
                    .into_iter()
                    .map(|(_, line)| (line.i_id, line.supply_w_id))
                    .sorted()
                    .map(|(i_id, _)| (w_id, i_id))
                    .collect();
                cx.phase().stock_level()?.items = Some(items);
            }
            StockLevelAction::Stock {
                items, threshold, ..
            } => {
                let mut stock = Vec::with_capacity(items.len());
                for key in items.iter() {
                    stock.push((key.1, db.stock.lookup(key)?.quantity));
                }
                cx.phase().stock_level()?.low_stock = count_low_stock(stock, *threshold);
            }
        }
        Ok(())
    }
}

pub(crate) fn submit(
    engine: &Engine<Tpcc>,
    input: StockLevelInput,
) -> EngineResult<TrxHandle<Tpcc>> {
    let StockLevelInput {
        w_id,
        d_id,
        threshold,
    } = input;
    let phase = StockLevelPhase {
        w_id,
        d_id,
        threshold,
        ..Default::default()
    };
    let admission = engine
        .admit(TrxType::StockLevel)
        .midway(1, TpccPhase::StockLevel(phase))
        .midway(1, TpccPhase::Empty)
        .terminal(1, TpccPhase::Empty)?;
    let mut wave = admission.wave();
    wave.push(StockLevelAction::District { w_id, d_id }.into());
    wave.enqueue();
    Ok(admission.into_handle())
}

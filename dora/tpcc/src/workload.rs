//! The TPC-C workload as seen by the engine.

use dora_engine::{
    ActionBody, ActionContext, ActionKeys, Forward, PhaseBody, TableId, TrxError, Workload,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::mbench::MbenchAction;
use crate::new_order::{NewOrderAction, NewOrderLineOutput, NewOrderPhase};
use crate::order_status::{OrderStatusAction, OrderStatusPhase};
use crate::payment::{PaymentAction, PaymentPhase};
use crate::schema::{OrderLine, TpccDb};
use crate::stock_level::{StockLevelAction, StockLevelPhase};

#[derive(Debug)]
pub struct Tpcc;

impl Workload for Tpcc {
    type Body = TpccAction;
    type Db = TpccDb;
    type Output = TpccOutput;
    type Phase = TpccPhase;
    type TrxType = TrxType;
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TrxType {
    NewOrder,
    Payment,
    OrderStatus,
    StockLevel,
    MbenchWh,
    MbenchCust,
}

/// Result payload of a committed TPC-C transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TpccOutput {
    #[default]
    None,
    NewOrder {
        o_id: i32,
        total: f64,
        lines: Vec<NewOrderLineOutput>,
    },
    Payment {
        c_id: i32,
        balance: f64,
    },
    OrderStatus {
        c_id: i32,
        balance: f64,
        o_id: i32,
        carrier_id: Option<i32>,
        lines: Vec<OrderLine>,
    },
    StockLevel {
        low_stock: usize,
    },
    Mbench {
        value: f64,
    },
}

/// Every action body of every transaction graph.
#[derive(Debug)]
pub enum TpccAction {
    NewOrder(NewOrderAction),
    Payment(PaymentAction),
    OrderStatus(OrderStatusAction),
    StockLevel(StockLevelAction),
    Mbench(MbenchAction),
}

macro_rules! delegate {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            TpccAction::NewOrder($inner) => $body,
            TpccAction::Payment($inner) => $body,
            TpccAction::OrderStatus($inner) => $body,
            TpccAction::StockLevel($inner) => $body,
            TpccAction::Mbench($inner) => $body,
        }
    };
}

impl ActionBody<Tpcc> for TpccAction {
    fn table(&self) -> TableId {
        delegate!(self, a => a.table())
    }

    fn calc_keys(&self) -> ActionKeys {
        delegate!(self, a => a.calc_keys())
    }

    fn is_read_only(&self) -> bool {
        delegate!(self, a => a.is_read_only())
    }

    fn execute(&mut self, cx: &ActionContext<'_, Tpcc>) -> Result<(), TrxError> {
        delegate!(self, a => a.execute(cx))
    }
}

macro_rules! impl_from_action {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for TpccAction {
            fn from(action: $ty) -> Self {
                TpccAction::$variant(action)
            }
        })*
    };
}

impl_from_action!(
    NewOrder(NewOrderAction),
    Payment(PaymentAction),
    OrderStatus(OrderStatusAction),
    StockLevel(StockLevelAction),
    Mbench(MbenchAction),
);

/// Data carried by the RVPs of every transaction graph.
#[derive(Debug, Default)]
pub enum TpccPhase {
    #[default]
    Empty,
    NewOrder(NewOrderPhase),
    Payment(PaymentPhase),
    OrderStatus(OrderStatusPhase),
    StockLevel(StockLevelPhase),
    /// Value left by a micro-benchmark update.
    Mbench(f64),
}

macro_rules! phase_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub(crate) fn $name(&mut self) -> Result<&mut $ty, TrxError> {
            match self {
                TpccPhase::$variant(phase) => Ok(phase),
                other => Err(TrxError::Internal(format!(
                    "expected {} phase data, found {other:?}",
                    stringify!($variant)
                ))),
            }
        }
    };
}

impl TpccPhase {
    phase_accessor!(new_order, NewOrder, NewOrderPhase);
    phase_accessor!(payment, Payment, PaymentPhase);
    phase_accessor!(order_status, OrderStatus, OrderStatusPhase);
    phase_accessor!(stock_level, StockLevel, StockLevelPhase);
}

impl PhaseBody<Tpcc> for TpccPhase {
    fn forward(&mut self, next: &mut Forward<'_, Tpcc>) -> Result<(), TrxError> {
        match self {
            TpccPhase::NewOrder(phase) => phase.forward(next),
            TpccPhase::Payment(phase) => phase.forward(next),
            TpccPhase::StockLevel(phase) => phase.forward(next),
            TpccPhase::Empty | TpccPhase::OrderStatus(_) | TpccPhase::Mbench(_) => Ok(()),
        }
    }

    fn output(&mut self) -> TpccOutput {
        match self {
            TpccPhase::Empty => TpccOutput::None,
            TpccPhase::NewOrder(phase) => phase.output(),
            TpccPhase::Payment(phase) => phase.output(),
            TpccPhase::OrderStatus(phase) => phase.output(),
            TpccPhase::StockLevel(phase) => phase.output(),
            TpccPhase::Mbench(value) => TpccOutput::Mbench { value: *value },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_trx_type_names() {
        assert_eq!(TrxType::NewOrder.to_string(), "new-order");
        assert_eq!(TrxType::from_str("mbench-cust").unwrap(), TrxType::MbenchCust);
    }

    #[test]
    fn test_wrong_phase_is_internal() {
        let mut phase = TpccPhase::Mbench(1.0);
        let err = phase.payment().unwrap_err();
        assert!(matches!(err, TrxError::Internal(_)));
        assert_eq!(phase.output(), TpccOutput::Mbench { value: 1.0 });
    }
}

//! Transaction inputs and a uniform random input generator.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strum::{Display, EnumIter, EnumString};

use crate::config::ScaleConfig;
use crate::loader::last_name_of;
use crate::workload::TrxType;

/// Most lines a New-Order may carry.
pub const MAX_OL_CNT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLineInput {
    pub i_id: i32,
    pub supply_w_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderInput {
    pub w_id: i32,
    pub d_id: i32,
    pub c_id: i32,
    pub lines: Vec<OrderLineInput>,
    pub entry_d: u64,
}

impl NewOrderInput {
    pub fn all_local(&self) -> bool {
        self.lines.iter().all(|l| l.supply_w_id == self.w_id)
    }
}

/// How Payment and Order-Status pick their customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerSelector {
    ById(i32),
    ByLastName(SmolStr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInput {
    pub w_id: i32,
    pub d_id: i32,
    pub c_w_id: i32,
    pub c_d_id: i32,
    pub customer: CustomerSelector,
    pub amount: f64,
    pub date: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatusInput {
    pub w_id: i32,
    pub d_id: i32,
    pub customer: CustomerSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevelInput {
    pub w_id: i32,
    pub d_id: i32,
    pub threshold: i32,
}

/// Single-row updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MbenchInput {
    Warehouse {
        w_id: i32,
        amount: f64,
    },
    Customer {
        w_id: i32,
        d_id: i32,
        c_id: i32,
        amount: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrxRequest {
    NewOrder(NewOrderInput),
    Payment(PaymentInput),
    OrderStatus(OrderStatusInput),
    StockLevel(StockLevelInput),
    Mbench(MbenchInput),
}

impl TrxRequest {
    pub fn trx_type(&self) -> TrxType {
        match self {
            TrxRequest::NewOrder(_) => TrxType::NewOrder,
            TrxRequest::Payment(_) => TrxType::Payment,
            TrxRequest::OrderStatus(_) => TrxType::OrderStatus,
            TrxRequest::StockLevel(_) => TrxType::StockLevel,
            TrxRequest::Mbench(MbenchInput::Warehouse { .. }) => TrxType::MbenchWh,
            TrxRequest::Mbench(MbenchInput::Customer { .. }) => TrxType::MbenchCust,
        }
    }
}

/// Which transactions a generator produces.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Mix {
    /// New-Order 45%, Payment 43%, Order-Status 6%, Stock-Level 6%.
    #[default]
    Tpcc,
    NewOrder,
    Payment,
    OrderStatus,
    StockLevel,
    MbenchWh,
    MbenchCust,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Uniform random inputs over a database scale.
///
/// One New-Order in a hundred names an item that does not exist, and 60% of
/// Payment and Order-Status select the customer by last name.
pub struct InputGenerator {
    rng: StdRng,
    scale: ScaleConfig,
    /// Restricts the home warehouse, e.g. one per client.
    home: Option<i32>,
}

impl InputGenerator {
    pub fn new(scale: ScaleConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            scale,
            home: None,
        }
    }

    pub fn with_home(mut self, w_id: i32) -> Self {
        self.home = Some(w_id);
        self
    }

    fn warehouse(&mut self) -> i32 {
        match self.home {
            Some(w_id) => w_id,
            None => self.rng.random_range(1..=self.scale.warehouses),
        }
    }

    fn district(&mut self) -> i32 {
        self.rng.random_range(1..=self.scale.districts_per_warehouse)
    }

    fn customer(&mut self) -> i32 {
        self.rng.random_range(1..=self.scale.customers_per_district)
    }

    /// Another warehouse than `w_id` in `remote_pct` percent of the cases.
    fn maybe_remote(&mut self, w_id: i32, remote_pct: u32) -> i32 {
        if self.scale.warehouses > 1 && self.rng.random_ratio(remote_pct, 100) {
            let other = self.rng.random_range(1..self.scale.warehouses);
            if other >= w_id { other + 1 } else { other }
        } else {
            w_id
        }
    }

    fn selector(&mut self) -> CustomerSelector {
        let c_id = self.customer();
        if self.rng.random_ratio(60, 100) {
            CustomerSelector::ByLastName(last_name_of(&self.scale, c_id))
        } else {
            CustomerSelector::ById(c_id)
        }
    }

    pub fn new_order(&mut self) -> NewOrderInput {
        let w_id = self.warehouse();
        let d_id = self.district();
        let c_id = self.customer();
        let ol_cnt = self.rng.random_range(5..=MAX_OL_CNT);
        let rollback = self.rng.random_ratio(1, 100);
        let mut lines: Vec<OrderLineInput> = (0..ol_cnt)
            .map(|_| OrderLineInput {
                i_id: self.rng.random_range(1..=self.scale.items),
                supply_w_id: self.maybe_remote(w_id, 1),
                quantity: self.rng.random_range(1..=10),
            })
            .collect();
        if rollback {
            if let Some(last) = lines.last_mut() {
                last.i_id = self.scale.items + 1;
            }
        }
        NewOrderInput {
            w_id,
            d_id,
            c_id,
            lines,
            entry_d: now(),
        }
    }

    pub fn payment(&mut self) -> PaymentInput {
        let w_id = self.warehouse();
        let d_id = self.district();
        let c_w_id = self.maybe_remote(w_id, 15);
        let c_d_id = if c_w_id == w_id { d_id } else { self.district() };
        PaymentInput {
            w_id,
            d_id,
            c_w_id,
            c_d_id,
            customer: self.selector(),
            amount: self.rng.random_range(100..=500_000) as f64 / 100.0,
            date: now(),
        }
    }

    pub fn order_status(&mut self) -> OrderStatusInput {
        OrderStatusInput {
            w_id: self.warehouse(),
            d_id: self.district(),
            customer: self.selector(),
        }
    }

    pub fn stock_level(&mut self) -> StockLevelInput {
        StockLevelInput {
            w_id: self.warehouse(),
            d_id: self.district(),
            threshold: self.rng.random_range(10..=20),
        }
    }

    pub fn mbench_wh(&mut self) -> MbenchInput {
        MbenchInput::Warehouse {
            w_id: self.warehouse(),
            amount: self.rng.random_range(100..=500_000) as f64 / 100.0,
        }
    }

    pub fn mbench_cust(&mut self) -> MbenchInput {
        MbenchInput::Customer {
            w_id: self.warehouse(),
            d_id: self.district(),
            c_id: self.customer(),
            amount: self.rng.random_range(100..=500_000) as f64 / 100.0,
        }
    }

    pub fn next_request(&mut self, mix: Mix) -> TrxRequest {
        match mix {
            Mix::Tpcc => match self.rng.random_range(0..100) {
                0..45 => TrxRequest::NewOrder(self.new_order()),
                45..88 => TrxRequest::Payment(self.payment()),
                88..94 => TrxRequest::OrderStatus(self.order_status()),
                _ => TrxRequest::StockLevel(self.stock_level()),
            },
            Mix::NewOrder => TrxRequest::NewOrder(self.new_order()),
            Mix::Payment => TrxRequest::Payment(self.payment()),
            Mix::OrderStatus => TrxRequest::OrderStatus(self.order_status()),
            Mix::StockLevel => TrxRequest::StockLevel(self.stock_level()),
            Mix::MbenchWh => TrxRequest::Mbench(self.mbench_wh()),
            Mix::MbenchCust => TrxRequest::Mbench(self.mbench_cust()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_mix_names() {
        assert_eq!(Mix::from_str("mbench-wh").unwrap(), Mix::MbenchWh);
        for mix in Mix::iter() {
            assert_eq!(Mix::from_str(&mix.to_string()).unwrap(), mix);
        }
    }

    #[test]
    fn test_inputs_stay_in_scale() {
        let scale = ScaleConfig::small();
        let mut generator = InputGenerator::new(scale.clone(), 1);
        let mut rollbacks = 0;
        for _ in 0..2000 {
            match generator.next_request(Mix::Tpcc) {
                TrxRequest::NewOrder(input) => {
                    assert!((5..=MAX_OL_CNT).contains(&input.lines.len()));
                    for line in &input.lines {
                        assert!((1..=scale.warehouses).contains(&line.supply_w_id));
                        if line.i_id > scale.items {
                            rollbacks += 1;
                        }
                    }
                }
                TrxRequest::Payment(input) => {
                    assert!((1..=scale.warehouses).contains(&input.c_w_id));
                    if input.c_w_id == input.w_id {
                        assert_eq!(input.c_d_id, input.d_id);
                    }
                }
                TrxRequest::StockLevel(input) => assert!((10..=20).contains(&input.threshold)),
                TrxRequest::OrderStatus(_) | TrxRequest::Mbench(_) => {}
            }
        }
        assert!(rollbacks > 0);
    }

    #[test]
    fn test_home_warehouse() {
        let mut generator = InputGenerator::new(ScaleConfig::small(), 3).with_home(2);
        for _ in 0..100 {
            assert_eq!(generator.stock_level().w_id, 2);
        }
        assert_eq!(
            TrxRequest::Mbench(generator.mbench_cust()).trx_type(),
            TrxType::MbenchCust
        );
    }
}

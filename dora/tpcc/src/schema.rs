//! TPC-C tables, keys and rows.
//!
//! Every table except `item` is partitioned on its warehouse id, so the
//! warehouse id always leads the key.

use dora_engine::{TableId, TableSpec};
use dora_storage::MemTable;
use smol_str::SmolStr;
use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

use crate::config::{MAX_DISTRICTS, PartitionConfig, ScaleConfig};

/// Partitioned tables, in engine registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
#[strum(serialize_all = "snake_case")]
pub enum TpccTable {
    Warehouse,
    District,
    Customer,
    History,
    NewOrder,
    Order,
    OrderLine,
    Item,
    Stock,
}

impl TpccTable {
    pub const fn id(self) -> TableId {
        TableId(self as usize)
    }

    fn partitions(self, parts: &PartitionConfig) -> usize {
        match self {
            TpccTable::Warehouse => parts.warehouse,
            TpccTable::District => parts.district,
            TpccTable::Customer => parts.customer,
            TpccTable::History => parts.history,
            TpccTable::NewOrder => parts.new_order,
            TpccTable::Order => parts.order,
            TpccTable::OrderLine => parts.order_line,
            TpccTable::Item => parts.item,
            TpccTable::Stock => parts.stock,
        }
    }

    /// Key domain and partition count of every table.
    pub fn specs(scale: &ScaleConfig, parts: &PartitionConfig) -> Vec<TableSpec> {
        TpccTable::iter()
            .map(|table| {
                let hi = match table {
                    TpccTable::Item => scale.items,
                    _ => scale.warehouses,
                };
                TableSpec::new(table.to_string(), 1, hi, table.partitions(parts))
            })
            .collect()
    }
}

pub type DistrictKey = (i32, i32);
/// (w_id, d_id, c_id)
pub type CustomerKey = (i32, i32, i32);
/// (w_id, d_id, c_last)
pub type CustomerNameKey = (i32, i32, SmolStr);
/// (w_id, d_id, c_id, transaction id); loaded rows use transaction id 0
pub type HistoryKey = (i32, i32, i32, u64);
/// (w_id, d_id, o_id)
pub type OrderKey = (i32, i32, i32);
/// (w_id, d_id, c_id, o_id)
pub type OrderByCustomerKey = (i32, i32, i32, i32);
/// (w_id, d_id, o_id, ol_number)
pub type OrderLineKey = (i32, i32, i32, i32);
/// (w_id, i_id)
pub type StockKey = (i32, i32);

#[derive(Debug, Clone, PartialEq)]
pub struct Warehouse {
    pub w_id: i32,
    pub name: SmolStr,
    pub city: SmolStr,
    pub tax: f64,
    pub ytd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct District {
    pub d_id: i32,
    pub w_id: i32,
    pub name: SmolStr,
    pub city: SmolStr,
    pub tax: f64,
    pub ytd: f64,
    pub next_o_id: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub c_id: i32,
    pub d_id: i32,
    pub w_id: i32,
    pub first: SmolStr,
    pub middle: SmolStr,
    pub last: SmolStr,
    pub phone: SmolStr,
    pub since: u64,
    /// `GC` or `BC`.
    pub credit: SmolStr,
    pub credit_lim: f64,
    pub discount: f64,
    pub balance: f64,
    pub ytd_payment: f64,
    pub payment_cnt: i32,
    pub delivery_cnt: i32,
    pub data: String,
}

impl Customer {
    pub fn has_bad_credit(&self) -> bool {
        self.credit == "BC"
    }
}

/// Entry of the customer last-name index, kept sorted by first name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NameEntry {
    pub first: SmolStr,
    pub c_id: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct History {
    pub c_id: i32,
    pub c_d_id: i32,
    pub c_w_id: i32,
    pub d_id: i32,
    pub w_id: i32,
    pub date: u64,
    pub amount: f64,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub o_id: i32,
    pub d_id: i32,
    pub w_id: i32,
    pub c_id: i32,
    pub entry_d: u64,
    pub carrier_id: Option<i32>,
    pub ol_cnt: i32,
    pub all_local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub o_id: i32,
    pub d_id: i32,
    pub w_id: i32,
    pub number: i32,
    pub i_id: i32,
    pub supply_w_id: i32,
    pub delivery_d: Option<u64>,
    pub quantity: i32,
    pub amount: f64,
    pub dist_info: SmolStr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub i_id: i32,
    pub im_id: i32,
    pub name: SmolStr,
    pub price: f64,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stock {
    pub i_id: i32,
    pub w_id: i32,
    pub quantity: i32,
    /// `S_DIST_01` to `S_DIST_10`.
    pub dist: [SmolStr; 10],
    pub ytd: i32,
    pub order_cnt: i32,
    pub remote_cnt: i32,
    pub data: String,
}

impl Stock {
    /// The district information for `d_id`.
    pub fn dist_info(&self, d_id: i32) -> SmolStr {
        self.dist[(d_id - 1).rem_euclid(MAX_DISTRICTS) as usize].clone()
    }
}

/// The TPC-C database.
#[derive(Clone)]
pub struct TpccDb {
    pub scale: ScaleConfig,
    pub warehouse: MemTable<i32, Warehouse>,
    pub district: MemTable<DistrictKey, District>,
    pub customer: MemTable<CustomerKey, Customer>,
    pub customer_by_name: MemTable<CustomerNameKey, Vec<NameEntry>>,
    pub history: MemTable<HistoryKey, History>,
    pub new_order: MemTable<OrderKey, NewOrder>,
    pub order: MemTable<OrderKey, Order>,
    pub order_by_customer: MemTable<OrderByCustomerKey, ()>,
    pub order_line: MemTable<OrderLineKey, OrderLine>,
    pub item: MemTable<i32, Item>,
    pub stock: MemTable<StockKey, Stock>,
}

impl TpccDb {
    pub fn empty(scale: ScaleConfig) -> Self {
        Self {
            scale,
            warehouse: MemTable::new("warehouse"),
            district: MemTable::new("district"),
            customer: MemTable::new("customer"),
            customer_by_name: MemTable::new("customer_by_name"),
            history: MemTable::new("history"),
            new_order: MemTable::new("new_order"),
            order: MemTable::new("order"),
            order_by_customer: MemTable::new("order_by_customer"),
            order_line: MemTable::new("order_line"),
            item: MemTable::new("item"),
            stock: MemTable::new("stock"),
        }
    }

    /// The most recent order of a customer.
    pub fn last_order_of(&self, w_id: i32, d_id: i32, c_id: i32) -> Option<i32> {
        self.order_by_customer
            .last_in((w_id, d_id, c_id, i32::MIN)..=(w_id, d_id, c_id, i32::MAX))
            .map(|((_, _, _, o_id), ())| o_id)
    }

    /// Order lines of one order, by line number.
    pub fn lines_of(&self, w_id: i32, d_id: i32, o_id: i32) -> Vec<OrderLine> {
        self.order_line
            .scan((w_id, d_id, o_id, i32::MIN)..=(w_id, d_id, o_id, i32::MAX))
            .into_iter()
            .map(|(_, line)| line)
            .collect()
    }
}

use dora_engine::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::{TpccError, TpccResult};

/// Stock rows carry district information for this many districts.
pub const MAX_DISTRICTS: i32 = 10;

/// Size of the generated database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub warehouses: i32,
    pub districts_per_warehouse: i32,
    pub customers_per_district: i32,
    pub items: i32,
    /// Distinct customer last names per district; names repeat beyond this.
    pub last_names: i32,
    pub seed: u64,
}

impl ScaleConfig {
    /// A database small enough for unit tests.
    pub fn small() -> Self {
        Self {
            warehouses: 2,
            districts_per_warehouse: 4,
            customers_per_district: 30,
            items: 200,
            last_names: 10,
            seed: 7,
        }
    }

    pub fn validate(&self) -> TpccResult<()> {
        let positive = [
            ("warehouses", self.warehouses),
            ("districts_per_warehouse", self.districts_per_warehouse),
            ("customers_per_district", self.customers_per_district),
            ("items", self.items),
            ("last_names", self.last_names),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v <= 0) {
            return Err(TpccError::InvalidConfig(format!("{name} must be positive")));
        }
        if self.districts_per_warehouse > MAX_DISTRICTS {
            return Err(TpccError::InvalidConfig(format!(
                "at most {MAX_DISTRICTS} districts per warehouse are supported"
            )));
        }
        if self.last_names > 1000 {
            return Err(TpccError::InvalidConfig(
                "at most 1000 distinct last names exist".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            warehouses: 1,
            districts_per_warehouse: 10,
            customers_per_district: 3000,
            items: 100_000,
            last_names: 1000,
            seed: 42,
        }
    }
}

/// Partition count of every partitioned table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub warehouse: usize,
    pub district: usize,
    pub customer: usize,
    pub history: usize,
    pub new_order: usize,
    pub order: usize,
    pub order_line: usize,
    pub item: usize,
    pub stock: usize,
}

impl PartitionConfig {
    /// The same partition count for every table.
    pub fn uniform(partitions: usize) -> Self {
        Self {
            warehouse: partitions,
            district: partitions,
            customer: partitions,
            history: partitions,
            new_order: partitions,
            order: partitions,
            order_line: partitions,
            item: partitions,
            stock: partitions,
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self::uniform(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TpccConfig {
    pub scale: ScaleConfig,
    pub partitions: PartitionConfig,
    pub engine: EngineConfig,
}

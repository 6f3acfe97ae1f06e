use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Workload;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, EnqueueError};
use crate::key::Key;
use crate::partition::Partition;

/// Position of a partitioned table in its engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub usize);

/// Key domain and partition count of one table.
///
/// Keys are routed on their leading field, which must lie in `lo..=hi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub lo: i32,
    pub hi: i32,
    pub partitions: usize,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, lo: i32, hi: i32, partitions: usize) -> Self {
        Self {
            name: name.into(),
            lo,
            hi,
            partitions,
        }
    }
}

/// The partitions of one table, splitting its domain into equal contiguous
/// ranges with no gaps or overlaps.
pub struct PartTable<W: Workload> {
    id: TableId,
    spec: TableSpec,
    per_part: i64,
    parts: Vec<Arc<Partition<W>>>,
}

impl<W: Workload> PartTable<W> {
    pub(crate) fn new(id: TableId, spec: TableSpec, config: &EngineConfig) -> EngineResult<Self> {
        if spec.lo > spec.hi {
            return Err(EngineError::InvalidConfig(format!(
                "{}: empty key domain {}..={}",
                spec.name, spec.lo, spec.hi
            )));
        }
        if spec.partitions == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "{}: at least one partition is required",
                spec.name
            )));
        }
        let width = i64::from(spec.hi) - i64::from(spec.lo) + 1;
        let per_part = (width + spec.partitions as i64 - 1) / spec.partitions as i64;
        let count = (width + per_part - 1) / per_part;
        let parts = (0..count)
            .map(|i| {
                let lo = i64::from(spec.lo) + i * per_part;
                let hi = (lo + per_part - 1).min(i64::from(spec.hi));
                // both ends lie inside the i32 domain
                Arc::new(Partition::new(
                    &spec.name,
                    id,
                    i as usize,
                    lo as i32..=hi as i32,
                    config.queue_capacity,
                    config.idle_wait(),
                ))
            })
            .collect();
        Ok(Self {
            id,
            spec,
            per_part,
            parts,
        })
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    /// Index of the partition owning `key`. Depends on nothing but the key.
    pub fn route(&self, key: &Key) -> Result<usize, EnqueueError> {
        match key.lead() {
            Some(lead) if (self.spec.lo..=self.spec.hi).contains(&lead) => {
                Ok(((i64::from(lead) - i64::from(self.spec.lo)) / self.per_part) as usize)
            }
            _ => Err(EnqueueError::OutOfDomain {
                table: self.spec.name.clone(),
                key: key.to_string(),
            }),
        }
    }

    pub fn partition(&self, index: usize) -> Option<&Arc<Partition<W>>> {
        self.parts.get(index)
    }

    pub fn partitions(&self) -> &[Arc<Partition<W>>] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

use std::fmt::Debug;
use std::ops::RangeBounds;
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use crate::error::{StorageError, StorageResult};
use crate::txn::{StorageTxn, UndoRecord};

/// An ordered in-memory table keyed by `K`.
///
/// Cloning a `MemTable` yields another handle to the same rows.
pub struct MemTable<K, R> {
    name: &'static str,
    rows: Arc<SkipMap<K, R>>,
}

impl<K, R> Clone for MemTable<K, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            rows: self.rows.clone(),
        }
    }
}

/// Before-image of one row. `None` means the row did not exist.
struct RowUndo<K, R> {
    rows: Arc<SkipMap<K, R>>,
    key: K,
    before: Option<R>,
}

impl<K, R> UndoRecord for RowUndo<K, R>
where
    K: Ord + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn undo(self: Box<Self>) {
        let RowUndo { rows, key, before } = *self;
        match before {
            Some(row) => {
                rows.insert(key, row);
            }
            None => {
                rows.remove(&key);
            }
        }
    }
}

impl<K, R> MemTable<K, R>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: Arc::new(SkipMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn not_found(&self, key: &K) -> StorageError {
        StorageError::NotFound {
            table: self.name,
            key: format!("{key:?}"),
        }
    }

    /// Non-transactional insert used while loading a database.
    pub fn load(&self, key: K, row: R) {
        self.rows.insert(key, row);
    }

    /// Returns a copy of the row stored under `key`.
    pub fn lookup(&self, key: &K) -> StorageResult<R> {
        self.rows
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| self.not_found(key))
    }

    /// Like [`lookup`](Self::lookup), but fails if `txn` can no longer write.
    pub fn lookup_for_update(&self, txn: &StorageTxn, key: &K) -> StorageResult<R> {
        txn.ensure_active()?;
        self.lookup(key)
    }

    /// Replaces an existing row.
    pub fn update(&self, txn: &StorageTxn, key: &K, row: R) -> StorageResult<()> {
        txn.ensure_active()?;
        let before = self.lookup(key)?;
        self.rows.insert(key.clone(), row);
        txn.record(Box::new(RowUndo {
            rows: self.rows.clone(),
            key: key.clone(),
            before: Some(before),
        }));
        Ok(())
    }

    /// Reads a row, applies `f` to it and writes it back.
    pub fn modify<T>(
        &self,
        txn: &StorageTxn,
        key: &K,
        f: impl FnOnce(&mut R) -> T,
    ) -> StorageResult<T> {
        let mut row = self.lookup_for_update(txn, key)?;
        let out = f(&mut row);
        self.update(txn, key, row)?;
        Ok(out)
    }

    pub fn insert(&self, txn: &StorageTxn, key: K, row: R) -> StorageResult<()> {
        txn.ensure_active()?;
        if self.rows.contains_key(&key) {
            return Err(StorageError::Duplicate {
                table: self.name,
                key: format!("{key:?}"),
            });
        }
        self.rows.insert(key.clone(), row);
        txn.record(Box::new(RowUndo {
            rows: self.rows.clone(),
            key,
            before: None,
        }));
        Ok(())
    }

    /// Removes a row and returns it.
    pub fn delete(&self, txn: &StorageTxn, key: &K) -> StorageResult<R> {
        txn.ensure_active()?;
        let entry = self.rows.remove(key).ok_or_else(|| self.not_found(key))?;
        let before = entry.value().clone();
        txn.record(Box::new(RowUndo {
            rows: self.rows.clone(),
            key: key.clone(),
            before: Some(before.clone()),
        }));
        Ok(before)
    }

    /// Returns copies of all rows in `range`, in key order.
    pub fn scan<B>(&self, range: B) -> Vec<(K, R)>
    where
        B: RangeBounds<K>,
    {
        self.rows
            .range(range)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Returns the row with the greatest key in `range`.
    pub fn last_in<B>(&self, range: B) -> Option<(K, R)>
    where
        B: RangeBounds<K>,
    {
        self.rows
            .range(range)
            .next_back()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
    }
}

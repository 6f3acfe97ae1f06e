use std::sync::Arc;

use dora_storage::{MemTable, MemTxnManager, StorageTxn};
use dora_transaction::TxnManager;

pub struct Fixture {
    pub manager: MemTxnManager,
    pub accounts: MemTable<u32, i64>,
}

/// Ten accounts with a balance of 100 each.
pub fn create_fixture() -> Fixture {
    let accounts = MemTable::new("account");
    for id in 1..=10 {
        accounts.load(id, 100);
    }
    Fixture {
        manager: MemTxnManager::new(),
        accounts,
    }
}

impl Fixture {
    pub fn begin(&self) -> Arc<StorageTxn> {
        self.manager.begin().unwrap()
    }

    pub fn total(&self) -> i64 {
        self.accounts.scan(..).into_iter().map(|(_, v)| v).sum()
    }
}

use std::fmt;
use std::sync::Arc;

use dora_engine::{
    ActionBody, ActionContext, ActionKeys, Engine, EngineConfig, Forward, PhaseBody, TableId,
    TableSpec, TrxError, TrxHandle, TrxStats, Workload,
};
use dora_storage::MemTable;
use parking_lot::Mutex;

/// Accounts `1..=ACCOUNTS` exist; the domain reaches up to `DOMAIN_HI`.
pub const ACCOUNTS: i32 = 100;
pub const DOMAIN_HI: i32 = 110;
pub const INITIAL_BALANCE: i64 = 1000;
pub const ACCOUNT: TableId = TableId(0);

#[derive(Debug)]
pub struct Bank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankTrx {
    Transfer,
    Deposit,
    Audit,
}

impl fmt::Display for BankTrx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One executed action, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub tid: u64,
    pub phase: usize,
    pub acct: i32,
    pub seq: u64,
}

pub struct BankDb {
    pub accounts: MemTable<i32, i64>,
    pub journal: Mutex<Vec<Entry>>,
}

impl BankDb {
    fn record(&self, cx: &ActionContext<'_, Bank>, phase: usize, acct: i32, seq: u64) {
        self.journal.lock().push(Entry {
            tid: cx.txn_id().raw(),
            phase,
            acct,
            seq,
        });
    }
}

#[derive(Debug)]
pub enum BankAction {
    Debit { acct: i32, amount: i64, phase: usize },
    Credit { acct: i32, amount: i64, phase: usize, seq: u64 },
    Read { acct: i32 },
    Misrouted { down: i32, up: i32 },
}

impl ActionBody<Bank> for BankAction {
    fn table(&self) -> TableId {
        ACCOUNT
    }

    fn calc_keys(&self) -> ActionKeys {
        match *self {
            BankAction::Debit { acct, .. }
            | BankAction::Credit { acct, .. }
            | BankAction::Read { acct } => ActionKeys::point([acct]),
            BankAction::Misrouted { down, up } => ActionKeys::range([down], [up]),
        }
    }

    fn is_read_only(&self) -> bool {
        matches!(self, BankAction::Read { .. })
    }

    fn execute(&mut self, cx: &ActionContext<'_, Bank>) -> Result<(), TrxError> {
        let db = cx.db();
        match *self {
            BankAction::Debit {
                acct,
                amount,
                phase,
            } => {
                db.record(cx, phase, acct, 0);
                db.accounts
                    .modify(cx.xct_for_update()?, &acct, |b| *b -= amount)?;
            }
            BankAction::Credit {
                acct,
                amount,
                phase,
                seq,
            } => {
                db.record(cx, phase, acct, seq);
                db.accounts
                    .modify(cx.xct_for_update()?, &acct, |b| *b += amount)?;
            }
            BankAction::Read { acct } => {
                db.record(cx, 0, acct, 0);
                let balance = db.accounts.lookup(&acct)?;
                if let BankPhase::Audit { sum } = &mut *cx.phase() {
                    *sum += balance;
                }
            }
            BankAction::Misrouted { .. } => {}
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub enum BankPhase {
    #[default]
    Empty,
    /// Credits still to be applied, one wave per stage.
    Transfer {
        stages: Vec<Vec<(i32, i64)>>,
        phase: usize,
        refuse: bool,
    },
    Audit {
        sum: i64,
    },
}

impl PhaseBody<Bank> for BankPhase {
    fn forward(&mut self, next: &mut Forward<'_, Bank>) -> Result<(), TrxError> {
        let BankPhase::Transfer {
            stages,
            phase,
            refuse,
        } = self
        else {
            return Ok(());
        };
        if *refuse {
            return Err(TrxError::InvalidInput("transfer refused".into()));
        }
        let mut stages = std::mem::take(stages);
        if stages.is_empty() {
            return Ok(());
        }
        let phase = *phase + 1;
        for (acct, amount) in stages.remove(0) {
            next.push(BankAction::Credit {
                acct,
                amount,
                phase,
                seq: 0,
            });
        }
        if !stages.is_empty() {
            *next.next_phase() = BankPhase::Transfer {
                stages,
                phase,
                refuse: false,
            };
        }
        Ok(())
    }

    fn output(&mut self) -> i64 {
        match self {
            BankPhase::Audit { sum } => *sum,
            _ => 0,
        }
    }
}

impl Workload for Bank {
    type Body = BankAction;
    type Db = BankDb;
    type Output = i64;
    type Phase = BankPhase;
    type TrxType = BankTrx;
}

pub struct Fixture {
    pub engine: Engine<Bank>,
    pub stats: Arc<TrxStats<BankTrx>>,
}

pub fn create_bank(partitions: usize) -> Fixture {
    create_bank_with(partitions, EngineConfig::default())
}

pub fn create_bank_with(partitions: usize, config: EngineConfig) -> Fixture {
    let accounts = MemTable::new("account");
    for acct in 1..=ACCOUNTS {
        accounts.load(acct, INITIAL_BALANCE);
    }
    let db = BankDb {
        accounts,
        journal: Mutex::new(Vec::new()),
    };
    let stats = Arc::new(TrxStats::new());
    let engine = Engine::builder(db)
        .config(config)
        .table(TableSpec::new("account", 1, DOMAIN_HI, partitions))
        .stats_sink(stats.clone())
        .build()
        .unwrap();
    Fixture { engine, stats }
}

impl Fixture {
    /// Debits in the first phase, then one credit wave per stage.
    pub fn transfer(
        &self,
        debits: &[(i32, i64)],
        stages: Vec<Vec<(i32, i64)>>,
        refuse: bool,
    ) -> TrxHandle<Bank> {
        let last = stages.last().map_or(1, |s| s.len());
        let mut builder = self.engine.admit(BankTrx::Transfer).midway(
            debits.len(),
            BankPhase::Transfer {
                stages: stages.clone(),
                phase: 0,
                refuse,
            },
        );
        for stage in &stages[..stages.len().saturating_sub(1)] {
            builder = builder.midway(stage.len(), BankPhase::Empty);
        }
        let admission = builder.terminal(last, BankPhase::Empty).unwrap();
        let mut wave = admission.wave();
        for &(acct, amount) in debits {
            wave.push(BankAction::Debit {
                acct,
                amount,
                phase: 0,
            });
        }
        wave.enqueue();
        admission.into_handle()
    }

    pub fn deposit(&self, acct: i32, amount: i64, seq: u64) -> TrxHandle<Bank> {
        let admission = self
            .engine
            .admit(BankTrx::Deposit)
            .terminal(1, BankPhase::Empty)
            .unwrap();
        let mut wave = admission.wave();
        wave.push(BankAction::Credit {
            acct,
            amount,
            phase: 0,
            seq,
        });
        wave.enqueue();
        admission.into_handle()
    }

    pub fn audit(&self, accts: impl IntoIterator<Item = i32>) -> TrxHandle<Bank> {
        let accts: Vec<_> = accts.into_iter().collect();
        let admission = self
            .engine
            .admit(BankTrx::Audit)
            .terminal(accts.len(), BankPhase::Audit { sum: 0 })
            .unwrap();
        let mut wave = admission.wave();
        for acct in accts {
            wave.push(BankAction::Read { acct });
        }
        wave.enqueue();
        admission.into_handle()
    }

    pub fn balance(&self, acct: i32) -> i64 {
        self.engine.db().accounts.lookup(&acct).unwrap()
    }

    pub fn total(&self) -> i64 {
        self.engine
            .db()
            .accounts
            .scan(..)
            .into_iter()
            .map(|(_, b)| b)
            .sum()
    }

    pub fn journal(&self) -> Vec<Entry> {
        self.engine.db().journal.lock().clone()
    }
}

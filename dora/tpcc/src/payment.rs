//! Payment: three independent updates, then the history insert.

use dora_engine::{
    ActionBody, ActionContext, ActionKeys, Engine, EngineResult, Forward, TableId, TrxError,
    TrxHandle,
};
use smol_str::SmolStr;

use crate::input::{CustomerSelector, PaymentInput};
use crate::schema::{History, TpccDb, TpccTable};
use crate::workload::{Tpcc, TpccOutput, TpccPhase, TrxType};

/// Most customers a last-name lookup considers.
pub const MAX_NAME_MATCHES: usize = 100;
/// Length limit of `C_DATA`.
pub const MAX_C_DATA: usize = 500;

/// Position of the selected customer among `n` matches sorted by first name:
/// the `⌈n/2⌉`-th, zero based.
pub fn median_index(n: usize) -> usize {
    n.div_ceil(2).saturating_sub(1)
}

/// Resolves a customer selector to a customer id in district `(w_id, d_id)`.
pub(crate) fn select_customer(
    db: &TpccDb,
    w_id: i32,
    d_id: i32,
    selector: &CustomerSelector,
) -> Result<i32, TrxError> {
    let last = match selector {
        CustomerSelector::ById(c_id) => return Ok(*c_id),
        CustomerSelector::ByLastName(last) => last,
    };
    let entries = match db.customer_by_name.lookup(&(w_id, d_id, last.clone())) {
        Ok(entries) => entries,
        Err(err) if err.is_not_found() => Vec::new(),
        Err(err) => return Err(err.into()),
    };
    let matches = &entries[..entries.len().min(MAX_NAME_MATCHES)];
    matches
        .get(median_index(matches.len()))
        .map(|entry| entry.c_id)
        .ok_or_else(|| TrxError::not_found("customer", last))
}

/// Prepends the payment to a bad-credit customer's data.
fn bad_credit_data(data: &str, entry: &str) -> String {
    let mut out = String::with_capacity(MAX_C_DATA);
    out.extend(entry.chars().chain(data.chars()).take(MAX_C_DATA));
    out
}

#[derive(Debug, Default)]
pub struct PaymentPhase {
    w_id: i32,
    d_id: i32,
    c_w_id: i32,
    c_d_id: i32,
    amount: f64,
    date: u64,
    w_name: Option<SmolStr>,
    d_name: Option<SmolStr>,
    c_id: Option<i32>,
    balance: f64,
}

impl PaymentPhase {
    fn new(input: &PaymentInput) -> Self {
        Self {
            w_id: input.w_id,
            d_id: input.d_id,
            c_w_id: input.c_w_id,
            c_d_id: input.c_d_id,
            amount: input.amount,
            date: input.date,
            ..Default::default()
        }
    }

    pub(crate) fn forward(&mut self, next: &mut Forward<'_, Tpcc>) -> Result<(), TrxError> {
        let missing = |what: &str| TrxError::Internal(format!("payment left no {what}"));
        let w_name = self.w_name.as_ref().ok_or_else(|| missing("warehouse name"))?;
        let d_name = self.d_name.as_ref().ok_or_else(|| missing("district name"))?;
        let c_id = self.c_id.ok_or_else(|| missing("customer"))?;
        next.push(
            PaymentAction::History {
                row: History {
                    c_id,
                    c_d_id: self.c_d_id,
                    c_w_id: self.c_w_id,
                    d_id: self.d_id,
                    w_id: self.w_id,
                    date: self.date,
                    amount: self.amount,
                    data: format!("{w_name}    {d_name}"),
                },
            }
            .into(),
        );
        *next.next_phase() = TpccPhase::Payment(std::mem::take(self));
        Ok(())
    }

    pub(crate) fn output(&mut self) -> TpccOutput {
        TpccOutput::Payment {
            c_id: self.c_id.unwrap_or_default(),
            balance: self.balance,
        }
    }
}

#[derive(Debug)]
pub enum PaymentAction {
    Warehouse {
        w_id: i32,
        amount: f64,
    },
    District {
        w_id: i32,
        d_id: i32,
        amount: f64,
    },
    Customer {
        c_w_id: i32,
        c_d_id: i32,
        customer: CustomerSelector,
        w_id: i32,
        d_id: i32,
        amount: f64,
    },
    History {
        row: History,
    },
}

impl ActionBody<Tpcc> for PaymentAction {
    fn table(&self) -> TableId {
        match self {
            PaymentAction::Warehouse { .. } => TpccTable::Warehouse,
            PaymentAction::District { .. } => TpccTable::District,
            PaymentAction::Customer { .. } => TpccTable::Customer,
            PaymentAction::History { .. } => TpccTable::History,
        }
        .id()
    }

    fn calc_keys(&self) -> ActionKeys {
        match self {
            PaymentAction::Warehouse { w_id, .. } => ActionKeys::point([*w_id]),
            PaymentAction::District { w_id, d_id, .. } => ActionKeys::point([*w_id, *d_id]),
            // The customer id is not known before a name lookup.
            PaymentAction::Customer { c_w_id, c_d_id, .. } => {
                ActionKeys::point([*c_w_id, *c_d_id])
            }
            PaymentAction::History { row } => ActionKeys::point([row.w_id, row.d_id, row.c_id]),
        }
    }

    fn execute(&mut self, cx: &ActionContext<'_, Tpcc>) -> Result<(), TrxError> {
        let db = cx.db();
        match self {
            PaymentAction::Warehouse { w_id, amount } => {
                let name = db
                    .warehouse
                    .modify(cx.xct_for_update()?, w_id, |warehouse| {
                        warehouse.ytd += *amount;
                        warehouse.name.clone()
                    })?;
                cx.phase().payment()?.w_name = Some(name);
            }
            PaymentAction::District { w_id, d_id, amount } => {
                let name =
                    db.district
                        .modify(cx.xct_for_update()?, &(*w_id, *d_id), |district| {
                            district.ytd += *amount;
                            district.name.clone()
                        })?;
                cx.phase().payment()?.d_name = Some(name);
            }
            PaymentAction::Customer {
                c_w_id,
                c_d_id,
                customer,
                w_id,
                d_id,
                amount,
            } => {
                let c_id = select_customer(db, *c_w_id, *c_d_id, customer)?;
                let balance = db.customer.modify(
                    cx.xct_for_update()?,
                    &(*c_w_id, *c_d_id, c_id),
                    |customer| {
                        customer.balance -= *amount;
                        customer.ytd_payment += *amount;
                        customer.payment_cnt += 1;
                        if customer.has_bad_credit() {
                            let entry = format!(
                                "{c_id} {c_d_id} {c_w_id} {d_id} {w_id} {amount:.2} | "
                            );
                            customer.data = bad_credit_data(&customer.data, &entry);
                        }
                        customer.balance
                    },
                )?;
                let mut phase = cx.phase();
                let phase = phase.payment()?;
                phase.c_id = Some(c_id);
                phase.balance = balance;
            }
            PaymentAction::History { row } => {
                let key = (row.w_id, row.d_id, row.c_id, cx.txn_id().raw());
                db.history
                    .insert(cx.xct_for_update()?, key, row.clone())?;
            }
        }
        Ok(())
    }
}

pub(crate) fn submit(engine: &Engine<Tpcc>, input: PaymentInput) -> EngineResult<TrxHandle<Tpcc>> {
    let admission = engine
        .admit(TrxType::Payment)
        .midway(3, TpccPhase::Payment(PaymentPhase::new(&input)))
        .terminal(1, TpccPhase::Empty)?;
    let PaymentInput {
        w_id,
        d_id,
        c_w_id,
        c_d_id,
        customer,
        amount,
        ..
    } = input;
    let mut wave = admission.wave();
    wave.push(PaymentAction::Warehouse { w_id, amount }.into())
        .push(PaymentAction::District { w_id, d_id, amount }.into())
        .push(
            PaymentAction::Customer {
                c_w_id,
                c_d_id,
                customer,
                w_id,
                d_id,
                amount,
            }
            .into(),
        );
    wave.enqueue();
    Ok(admission.into_handle())
}

mod common;

use std::thread;

use approx::assert_relative_eq;
use common::*;
use dora_engine::ErrorClass;
use dora_tpcc::{InputGenerator, Mix, TrxType};
use strum::IntoEnumIterator;

const CLIENTS: u64 = 4;
const PER_CLIENT: usize = 150;
/// Transactions each client keeps in flight.
const DEPTH: usize = 4;

#[test]
fn test_concurrent_mix_keeps_tpcc_invariants() {
    let env = create_env(2);
    let scale = env.config().scale.clone();

    thread::scope(|s| {
        for client in 0..CLIENTS {
            let env = &env;
            let scale = scale.clone();
            s.spawn(move || {
                let mut generator = InputGenerator::new(scale, client);
                let mut in_flight = Vec::with_capacity(DEPTH);
                for _ in 0..PER_CLIENT {
                    in_flight.push(env.submit_nowait(generator.next_request(Mix::Tpcc)).unwrap());
                    if in_flight.len() == DEPTH {
                        for handle in in_flight.drain(..) {
                            let result = handle.wait();
                            // only the 1% invalid-item New-Orders may abort
                            if let Some(err) = result.error() {
                                assert_eq!(result.trx_type, TrxType::NewOrder, "{err}");
                                assert_eq!(err.class(), ErrorClass::UserData);
                            }
                        }
                    }
                }
                for handle in in_flight {
                    handle.wait();
                }
            });
        }
    });
    env.stop();

    let totals = env.stats().totals();
    assert_eq!(totals.attempted, CLIENTS * PER_CLIENT as u64);
    assert_eq!(totals.committed + totals.aborted, totals.attempted);
    assert_eq!(totals.aborted, totals.user_aborts);

    let db = env.db();
    for w_id in 1..=scale.warehouses {
        // W_YTD = sum(D_YTD)
        let w_ytd = db.warehouse.lookup(&w_id).unwrap().ytd;
        let d_ytd: f64 = (1..=scale.districts_per_warehouse)
            .map(|d_id| db.district.lookup(&(w_id, d_id)).unwrap().ytd)
            .sum();
        assert_relative_eq!(w_ytd, d_ytd, max_relative = 1e-9);

        for d_id in 1..=scale.districts_per_warehouse {
            // D_NEXT_O_ID - 1 = max(O_ID) = max(NO_O_ID)
            let next_o_id = db.district.lookup(&(w_id, d_id)).unwrap().next_o_id;
            let (max_order, _) = db
                .order
                .last_in((w_id, d_id, i32::MIN)..=(w_id, d_id, i32::MAX))
                .unwrap();
            let (max_new_order, _) = db
                .new_order
                .last_in((w_id, d_id, i32::MIN)..=(w_id, d_id, i32::MAX))
                .unwrap();
            assert_eq!(max_order.2, next_o_id - 1);
            assert_eq!(max_new_order.2, next_o_id - 1);

            // every order has its lines
            for (_, order) in db.order.scan((w_id, d_id, 1)..(w_id, d_id, next_o_id)) {
                let lines = db.lines_of(w_id, d_id, order.o_id);
                assert_eq!(lines.len(), order.ol_cnt as usize);
            }
        }
    }

    let actions = env.engine().action_cache_stats();
    assert_eq!(actions.requests, actions.givebacks);
    let rvps = env.engine().rvp_cache_stats();
    assert_eq!(rvps.requests, rvps.givebacks);
    assert_eq!(env.engine().txn_manager().committed_count(), totals.committed);
}

#[test]
fn test_every_single_type_mix_commits() {
    let env = create_env(3);
    let scale = env.config().scale.clone();
    let mut generator = InputGenerator::new(scale, 11);
    for mix in Mix::iter().filter(|m| *m != Mix::Tpcc && *m != Mix::NewOrder) {
        for _ in 0..20 {
            let result = env.submit(generator.next_request(mix)).unwrap();
            expect_committed(&result);
        }
    }
    let totals = env.stats().totals();
    assert_eq!(totals.committed, 100);
}

#[test]
fn test_submissions_after_stop_abort() {
    let env = create_env(2);
    env.stop();
    let result = env.submit(new_order(1, 1, 1, &[(1, 1, 1)])).unwrap();
    let err = expect_aborted(&result);
    assert_eq!(err.class(), ErrorClass::Enqueue);
    // nothing was executed, so nothing was written
    assert_eq!(env.db().order.len(), env.db().order_by_customer.len());
    assert!(env.engine().start().is_ok());
    let result = env.submit(new_order(1, 1, 1, &[(1, 1, 1)])).unwrap();
    expect_committed(&result);
}

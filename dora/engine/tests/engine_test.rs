mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use dora_engine::{EngineConfig, EnqueueError, ErrorClass, Key, TrxError, TrxStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_routing_is_pure_and_contiguous() {
    let fx = create_bank(4);
    assert_eq!(fx.engine.partition_count(ACCOUNT), Some(4));
    let mut last = 0;
    for acct in 1..=DOMAIN_HI {
        let key = Key::from([acct]);
        let first = fx.engine.route(ACCOUNT, &key).unwrap();
        for _ in 0..3 {
            assert_eq!(fx.engine.route(ACCOUNT, &key).unwrap(), first);
        }
        // ranges are contiguous and ascending
        assert!(first == last || first == last + 1);
        last = first;
    }
    assert_eq!(last, 3);
    assert!(matches!(
        fx.engine.route(ACCOUNT, &Key::from([0])),
        Err(EnqueueError::OutOfDomain { .. })
    ));
    assert!(matches!(
        fx.engine.route(ACCOUNT, &Key::default()),
        Err(EnqueueError::OutOfDomain { .. })
    ));
}

#[test]
fn test_more_partitions_than_keys() {
    let fx = create_bank(500);
    assert_eq!(fx.engine.partition_count(ACCOUNT), Some(DOMAIN_HI as usize));
    let stats = fx.engine.partition_stats();
    assert!(stats.iter().all(|s| s.lo == s.hi));
}

#[test]
fn test_partition_fifo() {
    let fx = create_bank(2);
    let handles: Vec<_> = (0..200).map(|seq| fx.deposit(7, 1, seq)).collect();
    for handle in handles {
        assert!(handle.wait().is_committed());
    }
    let seqs: Vec<u64> = fx
        .journal()
        .into_iter()
        .filter(|e| e.acct == 7)
        .map(|e| e.seq)
        .collect();
    assert_eq!(seqs, (0..200).collect::<Vec<_>>());
    assert_eq!(fx.balance(7), INITIAL_BALANCE + 200);
}

#[test]
fn test_phase_happens_before_under_contention() {
    let fx = Arc::new(create_bank(4));
    let workers: Vec<_> = (0..4)
        .map(|t| {
            let fx = fx.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t);
                let mut pick = || rng.random_range(1..=ACCOUNTS);
                let mut handles = Vec::new();
                for _ in 0..50 {
                    let debits = [(pick(), 5), (pick(), 5)];
                    let stages = vec![vec![(pick(), 4), (pick(), 4)], vec![(pick(), 2)]];
                    handles.push(fx.transfer(&debits, stages, false));
                }
                handles.into_iter().map(|h| h.wait()).collect::<Vec<_>>()
            })
        })
        .collect();
    let results: Vec<_> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();
    assert_eq!(results.len(), 200);
    // credits of later phases may wait on debits of other transfers in a
    // cycle; those lose with a conflict and are undone
    let committed: Vec<u64> = results
        .iter()
        .filter(|r| r.is_committed())
        .map(|r| r.tid.raw())
        .collect();
    for result in results.iter().filter(|r| !r.is_committed()) {
        assert_eq!(result.error().map(|e| e.class()), Some(ErrorClass::Conflict));
    }
    assert!(!committed.is_empty());
    assert_eq!(fx.total(), ACCOUNTS as i64 * INITIAL_BALANCE);
    let deadlocks: u64 = fx.engine.partition_stats().iter().map(|s| s.deadlocks).sum();
    assert!(deadlocks >= (results.len() - committed.len()) as u64);

    let mut per_txn: HashMap<u64, Vec<usize>> = HashMap::new();
    for entry in fx.journal() {
        per_txn.entry(entry.tid).or_default().push(entry.phase);
    }
    for phases in per_txn.values() {
        assert!(phases.windows(2).all(|w| w[0] <= w[1]), "{phases:?}");
    }
    for tid in &committed {
        assert_eq!(per_txn[tid].len(), 5);
    }
}

#[test]
fn test_rvp_fires_exactly_once() {
    let fx = Arc::new(create_bank(4));
    let clients: Vec<_> = (0..4)
        .map(|_| {
            let fx = fx.clone();
            thread::spawn(move || {
                (0..100)
                    .map(|_| fx.audit((1..=ACCOUNTS).step_by(5)))
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(|h| h.wait())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let results: Vec<_> = clients
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();
    assert_eq!(results.len(), 400);
    for result in &results {
        assert!(result.is_committed());
        assert_eq!(result.output, 20 * INITIAL_BALANCE);
        assert_eq!(result.actions, 20);
    }
    let fired: u64 = fx.engine.partition_stats().iter().map(|s| s.rvps_fired).sum();
    assert_eq!(fired, 400);
    let counters = fx.stats.get(BankTrx::Audit);
    assert_eq!(counters.attempted, 400);
    assert_eq!(counters.committed, 400);
}

#[test]
fn test_cache_objects_all_returned_after_stop() {
    let fx = create_bank(3);
    let handles: Vec<_> = (0..50)
        .map(|i| fx.transfer(&[(1 + i % 90, 1)], vec![vec![(2 + i % 90, 1)]], i % 7 == 0))
        .collect();
    for handle in handles {
        handle.wait();
    }
    fx.engine.stop();
    let actions = fx.engine.action_cache_stats();
    let rvps = fx.engine.rvp_cache_stats();
    assert!(actions.requests > 0);
    assert_eq!(actions.requests, actions.givebacks);
    assert_eq!(rvps.requests, rvps.givebacks);
    assert_eq!(rvps.requests, 100);
}

#[test]
fn test_sequential_transactions_reuse_cached_objects() {
    let fx = create_bank(2);
    for i in 0..2000 {
        assert!(fx.deposit(1 + i % ACCOUNTS, 1, 0).wait().is_committed());
    }
    let init = fx.engine.config().cache_init_count as u64;
    let actions = fx.engine.action_cache_stats();
    let rvps = fx.engine.rvp_cache_stats();
    assert_eq!(actions.requests, 2000);
    assert_eq!(rvps.requests, 2000);
    // one submitter keeps borrowing from the free list workers refill
    assert!(actions.setups <= init + 2, "{actions:?}");
    assert!(rvps.setups <= init + 2, "{rvps:?}");
}

#[test]
fn test_abort_does_not_undo_a_later_committed_write() {
    let fx = create_bank(2);
    // back up the partition that owns account 100 so the transfer's second
    // debit runs long after its first one
    let backlog: Vec<_> = (0..20000).map(|seq| fx.deposit(ACCOUNTS, 1, seq)).collect();
    let refused = fx.transfer(&[(5, 10), (ACCOUNTS, 10)], vec![vec![(6, 10)]], true);
    let deposit = fx.deposit(5, 1, 0);

    let refused = refused.wait();
    let deposit = deposit.wait();
    assert!(!refused.is_committed());
    assert!(deposit.is_committed());
    assert!(backlog.into_iter().all(|h| h.wait().is_committed()));
    assert_eq!(fx.balance(5), INITIAL_BALANCE + 1);
    assert_eq!(fx.balance(6), INITIAL_BALANCE);
    assert_eq!(fx.balance(ACCOUNTS), INITIAL_BALANCE + 20000);

    // the deposit reached account 5 only after the transfer was undone
    let order: Vec<u64> = fx
        .journal()
        .into_iter()
        .filter(|e| e.acct == 5)
        .map(|e| e.tid)
        .collect();
    assert_eq!(order, [refused.tid.raw(), deposit.tid.raw()]);
    let waits: u64 = fx.engine.partition_stats().iter().map(|s| s.lock_waits).sum();
    assert!(waits >= 1);
    fx.engine.stop();
    assert!(fx.engine.partition_stats().iter().all(|s| s.locked_keys == 0 && s.waiting == 0));
}

#[test]
fn test_reader_waits_for_uncommitted_writer() {
    let fx = create_bank(2);
    let backlog: Vec<_> = (0..5000).map(|seq| fx.deposit(ACCOUNTS, 1, seq)).collect();
    let refused = fx.transfer(&[(8, 500), (ACCOUNTS, 10)], vec![vec![(9, 10)]], true);
    let audit = fx.audit([8, 9]).wait();
    assert!(audit.is_committed());
    // the debit of account 8 is never seen: it was undone before the read
    assert_eq!(audit.output, 2 * INITIAL_BALANCE);
    assert!(!refused.wait().is_committed());
    assert!(backlog.into_iter().all(|h| h.wait().is_committed()));
}

#[test]
fn test_crossing_transfers_never_hang() {
    let fx = Arc::new(create_bank(2));
    let clients: Vec<_> = [(10, 90), (90, 10)]
        .into_iter()
        .map(|(from, to)| {
            let fx = fx.clone();
            thread::spawn(move || {
                (0..100)
                    .map(|_| fx.transfer(&[(from, 1)], vec![vec![(to, 1)]], false))
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(|h| h.wait())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let results: Vec<_> = clients
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();
    let committed = results.iter().filter(|r| r.is_committed()).count() as i64;
    for result in results.iter().filter(|r| !r.is_committed()) {
        assert!(matches!(result.error(), Some(TrxError::Deadlock { .. })));
    }
    assert!(committed > 0);
    assert_eq!(fx.balance(10) + fx.balance(90), 2 * INITIAL_BALANCE);
    assert_eq!(fx.total(), ACCOUNTS as i64 * INITIAL_BALANCE);
    assert_eq!(
        fx.stats.get(BankTrx::Transfer).committed,
        committed as u64
    );
}

#[test]
fn test_failed_phase_one_aborts_and_counts() {
    let fx = create_bank(2);
    let missing = ACCOUNTS + 1;
    let result = fx
        .transfer(&[(1, 10), (missing, 10)], vec![vec![(2, 10)]], false)
        .wait();
    match &result.status {
        TrxStatus::Aborted(err @ TrxError::Storage(_)) => {
            assert_eq!(err.class(), ErrorClass::Storage)
        }
        other => panic!("unexpected status {other:?}"),
    }
    let counters = fx.stats.get(BankTrx::Transfer);
    assert_eq!(counters.attempted, 1);
    assert_eq!(counters.aborted, 1);
    assert_eq!(counters.committed, 0);
    // the successful debit is rolled back and phase two never ran
    assert_eq!(fx.balance(1), INITIAL_BALANCE);
    assert_eq!(fx.balance(2), INITIAL_BALANCE);
    assert!(fx.journal().iter().all(|e| e.phase == 0));
    assert_eq!(fx.engine.txn_manager().aborted_count(), 1);
}

#[test]
fn test_early_abort_skips_later_actions() {
    let fx = create_bank(2);
    let missing = ACCOUNTS + 1;
    let admission = fx
        .engine
        .admit(BankTrx::Transfer)
        .terminal(2, BankPhase::Empty)
        .unwrap();
    let mut wave = admission.wave();
    wave.push(BankAction::Debit {
        acct: missing,
        amount: 1,
        phase: 0,
    });
    wave.push(BankAction::Credit {
        acct: ACCOUNTS,
        amount: 1,
        phase: 0,
        seq: 0,
    });
    wave.enqueue();
    let result = admission.into_handle().wait();
    assert!(!result.is_committed());
    assert_eq!(result.actions, 1);
    let early: u64 = fx.engine.partition_stats().iter().map(|s| s.early_aborts).sum();
    assert_eq!(early, 1);
    assert_eq!(fx.balance(ACCOUNTS), INITIAL_BALANCE);
}

#[test]
fn test_forward_error_aborts() {
    let fx = create_bank(2);
    let result = fx.transfer(&[(3, 10)], vec![vec![(4, 10)]], true).wait();
    assert_eq!(
        result.error().map(|e| e.class()),
        Some(ErrorClass::UserData)
    );
    assert_eq!(fx.balance(3), INITIAL_BALANCE);
    assert_eq!(fx.balance(4), INITIAL_BALANCE);
}

#[test]
fn test_countdown_mismatch_aborts() {
    let fx = create_bank(2);
    let admission = fx
        .engine
        .admit(BankTrx::Deposit)
        .terminal(2, BankPhase::Empty)
        .unwrap();
    let mut wave = admission.wave();
    wave.push(BankAction::Credit {
        acct: 1,
        amount: 1,
        phase: 0,
        seq: 0,
    });
    wave.enqueue();
    let result = admission.into_handle().wait();
    assert_eq!(
        result.error().map(|e| e.class()),
        Some(ErrorClass::Internal)
    );
    assert_eq!(fx.balance(1), INITIAL_BALANCE);
}

#[test]
fn test_abort_before_enqueue() {
    let fx = create_bank(2);
    let admission = fx
        .engine
        .admit(BankTrx::Transfer)
        .midway(1, BankPhase::Empty)
        .terminal(1, BankPhase::Empty)
        .unwrap();
    let result = admission
        .abort(TrxError::not_found("account", "nobody"))
        .wait();
    assert_eq!(
        result.status,
        TrxStatus::Aborted(TrxError::not_found("account", "nobody"))
    );
    assert_eq!(fx.stats.get(BankTrx::Transfer).user_aborts, 1);
}

#[test]
fn test_misrouted_action_is_rejected() {
    let fx = create_bank(2);
    let admission = fx
        .engine
        .admit(BankTrx::Deposit)
        .terminal(1, BankPhase::Empty)
        .unwrap();
    let mut wave = admission.wave();
    wave.push(BankAction::Misrouted { down: 1, up: 100 });
    wave.enqueue();
    let result = admission.into_handle().wait();
    assert!(matches!(
        result.error(),
        Some(TrxError::Enqueue(EnqueueError::WrongPartition { .. }))
    ));
    assert_eq!(result.error().map(|e| e.class()), Some(ErrorClass::Routing));
}

#[test]
fn test_submit_after_stop_aborts_without_crashing() {
    let fx = create_bank(2);
    fx.engine.stop();
    assert!(!fx.engine.is_running());
    let result = fx.deposit(1, 5, 0).wait();
    assert!(matches!(
        result.error(),
        Some(TrxError::Enqueue(EnqueueError::Closed { .. }))
    ));
    assert_eq!(fx.balance(1), INITIAL_BALANCE);
    fx.engine.start().unwrap();
    assert!(fx.deposit(1, 5, 1).wait().is_committed());
    assert_eq!(fx.balance(1), INITIAL_BALANCE + 5);
}

#[test]
fn test_bounded_queue_rejects_when_full() {
    let config = EngineConfig {
        queue_capacity: Some(1),
        ..EngineConfig::default()
    };
    let fx = create_bank_with(1, config);
    // a single wave with two actions for the same partition overflows a
    // one-slot queue while the enqueue lock is held
    let admission = fx
        .engine
        .admit(BankTrx::Audit)
        .terminal(2, BankPhase::Audit { sum: 0 })
        .unwrap();
    let mut wave = admission.wave();
    wave.push(BankAction::Read { acct: 1 });
    wave.push(BankAction::Read { acct: 2 });
    wave.enqueue();
    let result = admission.into_handle().wait();
    assert_eq!(result.error().map(|e| e.class()), Some(ErrorClass::Enqueue));
}

#[test]
fn test_repartition_restarts_workers() {
    let fx = create_bank(2);
    assert!(fx.deposit(10, 1, 0).wait().is_committed());
    fx.engine.repartition(ACCOUNT, 5).unwrap();
    assert!(fx.engine.is_running());
    assert_eq!(fx.engine.partition_count(ACCOUNT), Some(5));
    let handles: Vec<_> = (1..=ACCOUNTS)
        .map(|acct| fx.deposit(acct, 1, 0))
        .collect();
    assert!(handles.into_iter().all(|h| h.wait().is_committed()));
    assert_eq!(fx.balance(10), INITIAL_BALANCE + 2);
    assert_eq!(fx.engine.partition_stats().len(), 5);
    assert!(fx.engine.repartition(dora_engine::TableId(9), 2).is_err());
}

#[test]
fn test_handle_wait_timeout() {
    let fx = create_bank(1);
    let handle = fx.deposit(1, 1, 0);
    let result = handle.wait_timeout(Duration::from_secs(10)).unwrap();
    assert!(result.is_committed());
    assert!(result.latency <= Duration::from_secs(10));
}

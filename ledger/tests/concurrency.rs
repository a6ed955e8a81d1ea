//! Concurrent access tests
//!
//! Many tasks hit the same rows at once on a multi-threaded runtime. Row
//! locks must serialize them without lost updates, negative balances or
//! deadlocks.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ledgerbank_common::AccountNumber;
use ledgerbank_ledger::store::MemoryStore;
use ledgerbank_ledger::{LedgerEngine, LedgerError, NewUser, Registry};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Barrier;

/// Upper bound for a whole test; hitting it means tasks are stuck.
const DEADLINE: Duration = Duration::from_secs(30);

async fn engine_with_accounts(numbers: &[&str]) -> (MemoryStore, Arc<LedgerEngine>) {
    let store = MemoryStore::with_lock_timeout(Duration::from_secs(10));
    let user = store.create_user(NewUser::new("concurrent")).await.unwrap();
    for number in numbers {
        store.open_account(user.id, (*number).into()).unwrap();
    }
    let engine = Arc::new(LedgerEngine::new(Arc::new(store.clone())));
    (store, engine)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deposits_are_not_lost() {
    let (store, engine) = engine_with_accounts(&["1111111111"]).await;
    let account = AccountNumber::from("1111111111");
    let barrier = Arc::new(Barrier::new(2));

    let tasks = (0..2).map(|_| {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        let account = account.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            engine.deposit(&account, dec!(10)).await
        })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(store.balance(&account), Some(dec!(20)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_deposits_on_one_row_all_apply() {
    const TASKS: usize = 64;
    let (store, engine) = engine_with_accounts(&["1111111111"]).await;
    let account = AccountNumber::from("1111111111");

    let tasks = (0..TASKS).map(|_| {
        let engine = Arc::clone(&engine);
        let account = account.clone();
        tokio::spawn(async move { engine.deposit(&account, dec!(0.25)).await })
    });

    let results = tokio::time::timeout(DEADLINE, join_all(tasks)).await.unwrap();
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));
    assert_eq!(store.balance(&account), Some(dec!(16.00)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_do_not_deadlock() {
    const ROUNDS: usize = 50;
    let (store, engine) = engine_with_accounts(&["1111111111", "2222222222"]).await;
    let a = AccountNumber::from("1111111111");
    let b = AccountNumber::from("2222222222");
    engine.deposit(&a, dec!(1000)).await.unwrap();
    engine.deposit(&b, dec!(1000)).await.unwrap();

    let barrier = Arc::new(Barrier::new(ROUNDS * 2));
    let mut tasks = Vec::with_capacity(ROUNDS * 2);
    for i in 0..ROUNDS {
        for (from, to, amount) in [(&a, &b, dec!(3)), (&b, &a, dec!(2))] {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let (from, to) = (from.clone(), to.clone());
            let amount = amount + Decimal::new(i as i64, 2);
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                engine.transfer(&from, &to, amount).await
            }));
        }
    }

    let results = tokio::time::timeout(DEADLINE, join_all(tasks))
        .await
        .expect("opposing transfers deadlocked");
    for result in results {
        result.unwrap().unwrap();
    }

    let total = store.balance(&a).unwrap() + store.balance(&b).unwrap();
    assert_eq!(total, dec!(2000));
    assert_eq!(engine.metrics().snapshot().lock_timeouts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_withdrawals_never_overdraw() {
    const TASKS: usize = 40;
    let (store, engine) = engine_with_accounts(&["1111111111"]).await;
    let account = AccountNumber::from("1111111111");
    engine.deposit(&account, dec!(100)).await.unwrap();

    let barrier = Arc::new(Barrier::new(TASKS));
    let tasks = (0..TASKS).map(|_| {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        let account = account.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            engine.withdraw(&account, dec!(10)).await
        })
    });

    let mut succeeded = 0;
    let mut refused = 0;
    for result in tokio::time::timeout(DEADLINE, join_all(tasks)).await.unwrap() {
        match result.unwrap() {
            Ok(update) => {
                assert!(update.new_balance >= Decimal::ZERO);
                succeeded += 1;
            }
            Err(LedgerError::InsufficientFunds { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(refused, TASKS - 10);
    assert_eq!(store.balance(&account), Some(Decimal::ZERO));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfer_ring_conserves_total() {
    let numbers = ["1000000001", "1000000002", "1000000003", "1000000004"];
    let (store, engine) = engine_with_accounts(&numbers).await;
    let accounts: Vec<AccountNumber> = numbers.iter().map(|n| (*n).into()).collect();
    for account in &accounts {
        engine.deposit(account, dec!(50)).await.unwrap();
    }

    let mut tasks = Vec::new();
    for round in 0..25 {
        for i in 0..accounts.len() {
            let engine = Arc::clone(&engine);
            let from = accounts[i].clone();
            let to = accounts[(i + 1 + round % 3) % accounts.len()].clone();
            tasks.push(tokio::spawn(async move {
                engine.transfer(&from, &to, dec!(7.5)).await
            }));
        }
    }

    for result in tokio::time::timeout(DEADLINE, join_all(tasks)).await.unwrap() {
        match result.unwrap() {
            Ok(()) | Err(LedgerError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let balances = store.balances();
    assert!(balances.values().all(|b| *b >= Decimal::ZERO));
    assert_eq!(balances.values().copied().sum::<Decimal>(), dec!(200));
}

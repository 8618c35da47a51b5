//! Ledger property tests
//!
//! Drives the public `Ledger` API from many threads and checks the properties
//! every sequence of operations must keep:
//! - balances never go negative
//! - a balance always equals the sum of its settled transactions
//! - concurrent debits of one wallet serialize
//! - crossing transfers never deadlock
//! - a purchase is refunded at most once
//!
//! Also walks through the reference withdraw, transfer, purchase and refund
//! scenarios, and checks what reaches the event publisher.

use rstest::rstest;
use rust_decimal::Decimal;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use wallet_ledger::core::{EventNotifier, LedgerConfig, RecordingPublisher};
use wallet_ledger::{
    Ledger, LedgerError, MemoryStore, PurchaseRequest, TransactionStatus, TransactionType,
};

fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn ledger() -> Ledger<MemoryStore> {
    Ledger::in_memory(LedgerConfig::default(), EventNotifier::disabled())
}

/// Ledger tuned for heavy contention: long lock waits and a generous retry budget
fn contended_ledger() -> Arc<Ledger<MemoryStore>> {
    let config = LedgerConfig::new(Duration::from_secs(10), 10, "wallet.payment");
    Arc::new(Ledger::in_memory(config, EventNotifier::disabled()))
}

fn purchase(user_id: u64, quantity: u32, unit_price: Decimal, order_id: u64) -> PurchaseRequest {
    PurchaseRequest {
        user_id,
        product_id: 7,
        quantity,
        unit_price,
        order_id,
    }
}

fn assert_reconciles(ledger: &Ledger<MemoryStore>, user_id: u64) {
    let reconciliation = ledger.reconcile(user_id).unwrap();
    assert!(
        reconciliation.is_consistent(),
        "user {} does not reconcile: {:?}",
        user_id,
        reconciliation
    );
}

#[rstest]
#[case::two_threads(2)]
#[case::ten_threads(10)]
#[case::thirty_two_threads(32)]
fn test_concurrent_withdrawals_serialize(#[case] threads: usize) {
    let ledger = contended_ledger();
    ledger.deposit(1, money(10000), "seed").unwrap();
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ledger.withdraw(1, money(6000), "race")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, LedgerError::InsufficientFunds { .. })));
    assert_eq!(ledger.get_wallet(1).unwrap().balance, money(4000));

    let withdrawals: Vec<_> = ledger
        .list_transactions(1)
        .unwrap()
        .into_iter()
        .filter(|tx| tx.tx_type == TransactionType::Expense)
        .collect();
    assert_eq!(withdrawals.len(), threads);
    assert_eq!(
        withdrawals
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .count(),
        1
    );
    assert!(withdrawals
        .iter()
        .all(|tx| tx.status != TransactionStatus::Pending));
    assert_reconciles(&ledger, 1);
}

#[test]
fn test_crossing_transfers_complete_without_deadlock() {
    let ledger = contended_ledger();
    ledger.deposit(1, money(100000), "seed").unwrap();
    ledger.deposit(2, money(100000), "seed").unwrap();

    let threads = 8;
    let transfers_per_thread = 25;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
            thread::spawn(move || {
                barrier.wait();
                (0..transfers_per_thread)
                    .map(|_| ledger.transfer(from, to, money(100), "ping"))
                    .filter(Result::is_ok)
                    .count()
            })
        })
        .collect();

    let completed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(completed, threads * transfers_per_thread);
    // Equal traffic in both directions
    assert_eq!(ledger.get_wallet(1).unwrap().balance, money(100000));
    assert_eq!(ledger.get_wallet(2).unwrap().balance, money(100000));
    assert_reconciles(&ledger, 1);
    assert_reconciles(&ledger, 2);
}

#[test]
fn test_mixed_concurrent_load_keeps_balances_non_negative() {
    let ledger = contended_ledger();
    let users = [1u64, 2, 3];
    for user in users {
        ledger.deposit(user, money(5000), "seed").unwrap();
    }

    let threads = 12;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for step in 0..20u64 {
                    let user = users[(i + step as usize) % users.len()];
                    let other = users[(i + step as usize + 1) % users.len()];
                    // Rejections are expected; only the invariants matter here
                    let _ = match (i as u64 + step) % 4 {
                        0 => ledger.withdraw(user, money(700), "load").map(drop),
                        1 => ledger.transfer(user, other, money(900), "load").map(drop),
                        2 => ledger
                            .purchase(purchase(user, 3, money(250), step))
                            .map(drop),
                        _ => ledger.deposit(user, money(300), "load").map(drop),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut total = Decimal::ZERO;
    for user in users {
        let wallet = ledger.get_wallet(user).unwrap();
        assert!(wallet.balance >= Decimal::ZERO, "negative balance: {:?}", wallet);
        assert_reconciles(&ledger, user);
        total += wallet.balance;
    }

    let deposits: Decimal = ledger
        .all_transactions()
        .unwrap()
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Completed)
        .filter(|tx| matches!(tx.tx_type, TransactionType::Income | TransactionType::Refund))
        .filter(|tx| !tx.description.starts_with("Transfer from"))
        .map(|tx| tx.amount)
        .sum();
    let spent: Decimal = ledger
        .all_transactions()
        .unwrap()
        .iter()
        .filter(|tx| tx.status.has_balance_effect())
        .filter(|tx| !tx.tx_type.is_credit())
        .filter(|tx| !tx.description.starts_with("Transfer to"))
        .map(|tx| tx.amount)
        .sum();
    assert_eq!(total, deposits - spent);
}

#[test]
fn test_concurrent_refunds_credit_once() {
    let ledger = contended_ledger();
    ledger.deposit(1, money(5000), "seed").unwrap();
    let original = ledger.purchase(purchase(1, 3, money(1000), 77)).unwrap();

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            let tx_id = original.id;
            thread::spawn(move || {
                barrier.wait();
                ledger.refund(tx_id, "duplicate click")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == LedgerError::already_refunded(original.id)));
    assert_eq!(ledger.get_wallet(1).unwrap().balance, money(5000));

    let refunds = ledger
        .list_transactions_by_order(77)
        .unwrap()
        .into_iter()
        .filter(|tx| tx.tx_type == TransactionType::Refund)
        .count();
    assert_eq!(refunds, 1);
    assert_reconciles(&ledger, 1);
}

#[test]
fn test_refund_after_refund_is_rejected_without_effect() {
    let ledger = ledger();
    ledger.deposit(1, money(5000), "seed").unwrap();
    let original = ledger.purchase(purchase(1, 1, money(2000), 1)).unwrap();

    ledger.refund(original.id, "first").unwrap();
    let before = ledger.all_transactions().unwrap().len();

    assert_eq!(
        ledger.refund(original.id, "second"),
        Err(LedgerError::already_refunded(original.id))
    );
    assert_eq!(ledger.all_transactions().unwrap().len(), before);
    assert_eq!(ledger.get_wallet(1).unwrap().balance, money(5000));
}

#[test]
fn test_scenario_withdraw_then_overdraw() {
    let ledger = ledger();
    ledger.deposit(1, money(10000), "seed").unwrap();

    let first = ledger.withdraw(1, money(3000), "x").unwrap();
    assert_eq!(first.status, TransactionStatus::Completed);
    assert_eq!(ledger.get_wallet(1).unwrap().balance, money(7000));

    let second = ledger.withdraw(1, money(100000), "y");
    assert!(matches!(second, Err(LedgerError::InsufficientFunds { .. })));
    assert_eq!(ledger.get_wallet(1).unwrap().balance, money(7000));

    let latest = &ledger.list_transactions(1).unwrap()[0];
    assert_eq!(latest.description, "y");
    assert_eq!(latest.status, TransactionStatus::Failed);
    assert_eq!(latest.amount, money(100000));
}

#[test]
fn test_scenario_transfer_moves_whole_balance() {
    let ledger = ledger();
    ledger.deposit(1, money(5000), "seed").unwrap();
    ledger.create_wallet(2).unwrap();

    let receipt = ledger.transfer(1, 2, money(5000), "pay").unwrap();

    assert_eq!(ledger.get_wallet(1).unwrap().balance, Decimal::ZERO);
    assert_eq!(ledger.get_wallet(2).unwrap().balance, money(5000));

    assert_eq!(receipt.debit.user_id, 1);
    assert_eq!(receipt.debit.tx_type, TransactionType::Expense);
    assert_eq!(receipt.debit.status, TransactionStatus::Completed);
    assert_eq!(receipt.credit.user_id, 2);
    assert_eq!(receipt.credit.tx_type, TransactionType::Income);
    assert_eq!(receipt.credit.status, TransactionStatus::Completed);

    assert_eq!(ledger.list_transactions(1).unwrap()[0].id, receipt.debit.id);
    assert_eq!(ledger.list_transactions(2).unwrap()[0].id, receipt.credit.id);
}

#[test]
fn test_scenario_purchase_over_balance() {
    let ledger = ledger();
    let wallet = ledger.deposit(1, money(2500), "seed").map(|tx| tx.wallet_id).unwrap();

    let result = ledger.purchase(purchase(1, 3, money(1000), 5));

    assert_eq!(
        result,
        Err(LedgerError::insufficient_funds(wallet, money(2500), money(3000)))
    );
    assert_eq!(ledger.get_wallet(1).unwrap().balance, money(2500));
    let recorded = ledger.list_transactions_by_order(5).unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, TransactionStatus::Failed);
}

#[test]
fn test_scenario_refund_completed_purchase() {
    let ledger = ledger();
    ledger.deposit(1, money(4000), "seed").unwrap();
    let original = ledger.purchase(purchase(1, 3, money(1000), 8)).unwrap();
    let before = ledger.get_wallet(1).unwrap().balance;

    let refund = ledger.refund(original.id, "customer request").unwrap();

    assert_eq!(ledger.get_wallet(1).unwrap().balance, before + money(3000));
    assert_eq!(
        ledger.get_transaction(original.id).unwrap().status,
        TransactionStatus::Refunded
    );
    assert_eq!(refund.tx_type, TransactionType::Refund);
    assert_eq!(refund.status, TransactionStatus::Completed);
    assert_eq!(refund.amount, money(3000));
    assert_eq!(refund.order_id, Some(8));
    assert_reconciles(&ledger, 1);
}

#[tokio::test]
async fn test_events_follow_committed_mutations() {
    let (notifier, relay) = EventNotifier::channel("wallet.payment");
    let ledger = Ledger::in_memory(LedgerConfig::default(), notifier);

    let deposit = ledger.deposit(1, money(5000), "seed").unwrap();
    let receipt = ledger.transfer(1, 2, money(2000), "pay").unwrap();
    assert!(ledger.withdraw(1, money(999900), "too much").is_err());
    let bought = ledger.purchase(purchase(1, 1, money(1000), 3)).unwrap();
    drop(ledger);

    let publisher = Arc::new(RecordingPublisher::new());
    let stats = relay.run(Arc::clone(&publisher)).await;

    assert_eq!(stats.published, 4);
    assert_eq!(stats.failed, 0);

    let messages = publisher.messages();
    let keys: Vec<String> = messages.iter().map(|m| m.key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            deposit.id.to_string(),
            receipt.debit.id.to_string(),
            receipt.credit.id.to_string(),
            bought.id.to_string(),
        ]
    );
    assert!(messages.iter().all(|m| m.topic == "wallet.payment"));

    let amounts: Vec<Decimal> = messages
        .iter()
        .map(|m| m.event().unwrap().amount)
        .collect();
    assert_eq!(
        amounts,
        vec![money(5000), money(-2000), money(2000), money(-1000)]
    );
    assert_eq!(messages[3].event().unwrap().order_id, Some(3));
}

#[tokio::test]
async fn test_publish_failures_leave_ledger_untouched() {
    let (notifier, relay) = EventNotifier::channel("wallet.payment");
    let ledger = Arc::new(Ledger::in_memory(LedgerConfig::default(), notifier));
    let relay = relay.spawn(Arc::new(RecordingPublisher::failing()));

    ledger.deposit(1, money(1000), "seed").unwrap();
    ledger.withdraw(1, money(400), "spend").unwrap();

    assert_eq!(ledger.get_wallet(1).unwrap().balance, money(600));
    drop(ledger);

    let stats = relay.await.unwrap();
    assert_eq!(stats.published, 0);
    assert_eq!(stats.failed, 2);
}

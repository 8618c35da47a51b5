//! Single-wallet balance mutations
//!
//! This module provides the `BalanceMutator`, which implements deposits,
//! withdrawals and purchases on top of the store's atomic adjust.
//!
//! Every mutation follows the same protocol:
//! 1. Validate the input (no store access on rejection)
//! 2. Resolve the wallet, creating it on first use
//! 3. Commit a `pending` record for audit
//! 4. In one unit of work: adjust the balance under the wallet's row lock and
//!    advance the record to `completed`
//! 5. On failure, mark the record `failed`; on success, notify
//!
//! The balance check and the balance write happen in step 4 under the same
//! lock. There is no read-then-write path.

use crate::core::retry::with_conflict_retry;
use crate::core::traits::LedgerStore;
use crate::core::transaction_log::{advance_status, TransactionLog};
use crate::types::{
    normalize_amount, LedgerError, NewTransaction, OrderId, ProductId, PurchaseRequest,
    Transaction, TransactionStatus, TransactionType, UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Deposit, withdraw and purchase against a single wallet
pub struct BalanceMutator<S> {
    store: Arc<S>,
    log: TransactionLog<S>,
}

impl<S: LedgerStore> BalanceMutator<S> {
    /// Create a new BalanceMutator
    ///
    /// # Arguments
    ///
    /// * `store` - Shared store handle
    /// * `log` - Record keeping shared with the other mutating components
    pub fn new(store: Arc<S>, log: TransactionLog<S>) -> Self {
        BalanceMutator { store, log }
    }

    /// Credit a user's wallet
    ///
    /// # Arguments
    ///
    /// * `user_id` - Wallet owner; the wallet is created if missing
    /// * `amount` - Positive amount with at most two fractional digits
    /// * `description` - Free text stored on the record
    ///
    /// # Returns
    ///
    /// The `completed` income record
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The amount is not positive or has too many fractional digits
    /// - The new balance would overflow
    /// - The wallet stayed locked past every retry (`StorageConflict`)
    pub fn deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<Transaction, LedgerError> {
        let amount = self.validate(user_id, "deposit", normalize_amount(amount, "amount"))?;

        self.apply(Mutation {
            user_id,
            tx_type: TransactionType::Income,
            amount,
            description: description.to_string(),
            purchase: None,
        })
    }

    /// Debit a user's wallet
    ///
    /// # Arguments
    ///
    /// * `user_id` - Wallet owner; the wallet is created if missing
    /// * `amount` - Positive amount with at most two fractional digits
    /// * `description` - Free text stored on the record
    ///
    /// # Returns
    ///
    /// The `completed` expense record
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The amount is not positive or has too many fractional digits
    /// - The balance is below `amount` when checked under the row lock
    /// - The wallet stayed locked past every retry (`StorageConflict`)
    ///
    /// In every error case past validation the record is left `failed` and the
    /// balance is unchanged.
    pub fn withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<Transaction, LedgerError> {
        let amount = self.validate(user_id, "withdraw", normalize_amount(amount, "amount"))?;

        self.apply(Mutation {
            user_id,
            tx_type: TransactionType::Expense,
            amount,
            description: description.to_string(),
            purchase: None,
        })
    }

    /// Pay for `quantity` units of a product
    ///
    /// Behaves as [`withdraw`](Self::withdraw) for `quantity * unit_price`,
    /// recording a `purchase` with the product, order and quantity attached.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The quantity is zero
    /// - The unit price is not positive or has too many fractional digits
    /// - The total overflows
    /// - The balance is below the total when checked under the row lock
    pub fn purchase(&self, request: PurchaseRequest) -> Result<Transaction, LedgerError> {
        let amount = self.validate(request.user_id, "purchase", Self::purchase_total(&request))?;

        self.apply(Mutation {
            user_id: request.user_id,
            tx_type: TransactionType::Purchase,
            amount,
            description: format!("Order #{} payment", request.order_id),
            purchase: Some((request.product_id, request.order_id, request.quantity)),
        })
    }

    fn purchase_total(request: &PurchaseRequest) -> Result<Decimal, LedgerError> {
        if request.quantity == 0 {
            return Err(LedgerError::validation("quantity must be greater than 0"));
        }
        let unit_price = normalize_amount(request.unit_price, "unit price")?;

        Decimal::from(request.quantity)
            .checked_mul(unit_price)
            .ok_or_else(|| {
                LedgerError::validation(format!(
                    "purchase total overflows: {} x {}",
                    request.quantity, unit_price
                ))
            })
    }

    fn validate(
        &self,
        user_id: UserId,
        operation: &str,
        result: Result<Decimal, LedgerError>,
    ) -> Result<Decimal, LedgerError> {
        result.inspect_err(|e| warn!(user_id, operation, error = %e, "mutation rejected"))
    }

    fn apply(&self, mutation: Mutation) -> Result<Transaction, LedgerError> {
        let wallet = self.store.get_or_create_wallet(mutation.user_id)?;

        let mut new = NewTransaction::pending(
            mutation.user_id,
            wallet.id,
            mutation.tx_type,
            mutation.amount,
            mutation.description,
        );
        if let Some((product_id, order_id, quantity)) = mutation.purchase {
            new = new.with_purchase(product_id, order_id, quantity);
        }
        let pending = self.log.open_pending(new)?;

        let delta = mutation.tx_type.signed(mutation.amount);
        let retries = self.log.config().max_conflict_retries;

        let result = with_conflict_retry(retries, mutation.tx_type.as_str(), || {
            self.store.atomically(|uow| {
                let balance = uow.atomic_adjust(wallet.id, delta)?;
                let tx = advance_status(uow, pending.id, TransactionStatus::Completed)?;
                Ok((tx, balance))
            })
        });

        match result {
            Ok((tx, balance)) => {
                info!(
                    tx_id = tx.id,
                    user_id = tx.user_id,
                    wallet_id = tx.wallet_id,
                    tx_type = %tx.tx_type,
                    amount = %tx.amount,
                    balance = %balance,
                    "transaction completed"
                );
                self.log.publish(&tx);
                Ok(tx)
            }
            Err(e) => {
                warn!(
                    tx_id = pending.id,
                    user_id = pending.user_id,
                    wallet_id = pending.wallet_id,
                    tx_type = %pending.tx_type,
                    amount = %pending.amount,
                    error = %e,
                    "transaction failed"
                );
                self.log.mark_failed(&[pending.id], &e);
                Err(e)
            }
        }
    }
}

/// Validated input for one single-wallet mutation
struct Mutation {
    user_id: UserId,
    tx_type: TransactionType,
    amount: Decimal,
    description: String,
    purchase: Option<(ProductId, OrderId, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LedgerConfig;
    use crate::core::memory_store::MemoryStore;
    use crate::core::notifier::EventNotifier;
    use crate::core::traits::TransactionFilter;
    use rstest::rstest;
    use crate::types::WalletId;
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, Instant};

    fn mutator() -> (Arc<MemoryStore>, BalanceMutator<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let log = TransactionLog::new(
            Arc::clone(&store),
            LedgerConfig::default(),
            EventNotifier::disabled(),
        );
        (Arc::clone(&store), BalanceMutator::new(store, log))
    }

    fn mutator_with(
        lock_timeout: Duration,
        max_conflict_retries: u32,
    ) -> (Arc<MemoryStore>, BalanceMutator<MemoryStore>) {
        let config = LedgerConfig::new(lock_timeout, max_conflict_retries, "wallet.payment");
        let store = Arc::new(MemoryStore::with_config(&config));
        let log = TransactionLog::new(Arc::clone(&store), config, EventNotifier::disabled());
        (Arc::clone(&store), BalanceMutator::new(store, log))
    }

    fn balance(store: &MemoryStore, user_id: UserId) -> Decimal {
        store.find_wallet(user_id).unwrap().unwrap().balance
    }

    /// Hold a wallet row lock on another thread for `hold`; returns once it is taken
    fn hold_wallet(
        store: &Arc<MemoryStore>,
        wallet_id: WalletId,
        hold: Duration,
    ) -> thread::JoinHandle<()> {
        let store = Arc::clone(store);
        let barrier = Arc::new(Barrier::new(2));
        let locked = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            store
                .atomically(|uow| {
                    uow.lock_wallet(wallet_id)?;
                    locked.wait();
                    thread::sleep(hold);
                    Ok(())
                })
                .unwrap();
        });
        barrier.wait();
        handle
    }

    #[test]
    fn test_deposit_creates_wallet_and_completes() {
        let (store, mutator) = mutator();

        let tx = mutator.deposit(1, Decimal::new(10000, 2), "top up").unwrap();

        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.tx_type, TransactionType::Income);
        assert_eq!(balance(&store, 1), Decimal::new(10000, 2));
    }

    #[test]
    fn test_withdraw_scenario() {
        let (store, mutator) = mutator();
        mutator.deposit(1, Decimal::new(10000, 2), "seed").unwrap();

        let ok = mutator.withdraw(1, Decimal::new(3000, 2), "x").unwrap();
        assert_eq!(ok.status, TransactionStatus::Completed);
        assert_eq!(balance(&store, 1), Decimal::new(7000, 2));

        let result = mutator.withdraw(1, Decimal::new(100000, 2), "y");
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(balance(&store, 1), Decimal::new(7000, 2));

        let records = store.list_transactions(TransactionFilter::User(1)).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].description, "y");
        assert_eq!(records[0].status, TransactionStatus::Failed);
    }

    #[rstest]
    #[case::zero(Decimal::ZERO)]
    #[case::negative(Decimal::new(-100, 2))]
    #[case::too_precise(Decimal::new(1001, 3))]
    fn test_invalid_amount_writes_nothing(#[case] amount: Decimal) {
        let (store, mutator) = mutator();

        assert!(matches!(
            mutator.deposit(1, amount, "bad"),
            Err(LedgerError::Validation { .. })
        ));
        assert!(matches!(
            mutator.withdraw(1, amount, "bad"),
            Err(LedgerError::Validation { .. })
        ));
        assert!(store.find_wallet(1).unwrap().is_none());
        assert!(store
            .list_transactions(TransactionFilter::All)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_purchase_insufficient_funds_leaves_balance() {
        let (store, mutator) = mutator();
        mutator.deposit(1, Decimal::new(2500, 2), "seed").unwrap();

        let result = mutator.purchase(PurchaseRequest {
            user_id: 1,
            product_id: 7,
            quantity: 3,
            unit_price: Decimal::new(1000, 2),
            order_id: 42,
        });

        let wallet = store.find_wallet(1).unwrap().unwrap();
        assert_eq!(
            result,
            Err(LedgerError::insufficient_funds(
                wallet.id,
                Decimal::new(2500, 2),
                Decimal::new(3000, 2)
            ))
        );
        assert_eq!(wallet.balance, Decimal::new(2500, 2));

        let failed = store.list_transactions(TransactionFilter::Order(42)).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, TransactionStatus::Failed);
        assert_eq!(failed[0].product_id, Some(7));
    }

    #[test]
    fn test_purchase_records_linkage() {
        let (store, mutator) = mutator();
        mutator.deposit(1, Decimal::new(5000, 2), "seed").unwrap();

        let tx = mutator
            .purchase(PurchaseRequest {
                user_id: 1,
                product_id: 7,
                quantity: 3,
                unit_price: Decimal::new(1000, 2),
                order_id: 42,
            })
            .unwrap();

        assert_eq!(tx.tx_type, TransactionType::Purchase);
        assert_eq!(tx.amount, Decimal::new(3000, 2));
        assert_eq!(tx.description, "Order #42 payment");
        assert_eq!((tx.product_id, tx.order_id, tx.quantity), (Some(7), Some(42), Some(3)));
        assert_eq!(balance(&store, 1), Decimal::new(2000, 2));
    }

    #[rstest]
    #[case::zero_quantity(0, Decimal::new(1000, 2))]
    #[case::zero_price(2, Decimal::ZERO)]
    #[case::overflow(u32::MAX, Decimal::from_i128_with_scale(10_i128.pow(26), 0))]
    fn test_purchase_validation(#[case] quantity: u32, #[case] unit_price: Decimal) {
        let (_, mutator) = mutator();

        let result = mutator.purchase(PurchaseRequest {
            user_id: 1,
            product_id: 7,
            quantity,
            unit_price,
            order_id: 1,
        });

        assert!(matches!(result, Err(LedgerError::Validation { .. })));
    }

    #[test]
    fn test_concurrent_withdrawals_exactly_one_succeeds() {
        let (store, mutator) = mutator();
        mutator.deposit(1, Decimal::new(10000, 2), "seed").unwrap();
        let mutator = Arc::new(mutator);
        let barrier = Arc::new(Barrier::new(10));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let mutator = Arc::clone(&mutator);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    mutator.withdraw(1, Decimal::new(6000, 2), "race")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, LedgerError::InsufficientFunds { .. })));
        assert_eq!(balance(&store, 1), Decimal::new(4000, 2));
    }

    #[rstest]
    #[case::deposit(TransactionType::Income)]
    #[case::withdraw(TransactionType::Expense)]
    fn test_lock_wait_timeout_fails_the_record(#[case] tx_type: TransactionType) {
        let (store, mutator) = mutator_with(Duration::from_millis(20), 1);
        mutator.deposit(1, Decimal::new(10000, 2), "seed").unwrap();
        let wallet_id = store.find_wallet(1).unwrap().unwrap().id;

        let holder = hold_wallet(&store, wallet_id, Duration::from_millis(400));
        let result = match tx_type {
            TransactionType::Income => mutator.deposit(1, Decimal::new(500, 2), "blocked"),
            _ => mutator.withdraw(1, Decimal::new(500, 2), "blocked"),
        };
        holder.join().unwrap();

        let error = result.unwrap_err();
        assert!(matches!(error, LedgerError::StorageConflict { .. }));
        assert!(error.is_retryable());
        assert_eq!(balance(&store, 1), Decimal::new(10000, 2));

        let records = store.list_transactions(TransactionFilter::User(1)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].description, "blocked");
        assert_eq!(records[0].tx_type, tx_type);
        assert_eq!(records[0].status, TransactionStatus::Failed);
    }

    #[test]
    fn test_conflict_retried_until_lock_released() {
        let lock_timeout = Duration::from_millis(50);
        let (store, mutator) = mutator_with(lock_timeout, 3);
        mutator.deposit(1, Decimal::new(10000, 2), "seed").unwrap();
        let wallet_id = store.find_wallet(1).unwrap().unwrap().id;

        let holder = hold_wallet(&store, wallet_id, Duration::from_millis(80));
        let started = Instant::now();
        let tx = mutator.withdraw(1, Decimal::new(3000, 2), "after wait").unwrap();
        let waited = started.elapsed();
        holder.join().unwrap();

        // The first attempt cannot outlast one lock timeout, so a retry finished it
        assert!(waited >= lock_timeout);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(balance(&store, 1), Decimal::new(7000, 2));
    }
}

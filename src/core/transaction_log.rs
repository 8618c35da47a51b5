//! Transaction record lifecycle and refunds
//!
//! `TransactionLog` owns the rules every mutating path shares:
//!
//! - each balance-affecting attempt opens exactly one `pending` record before
//!   the caller learns the outcome, and that record is advanced exactly once to
//!   `completed` or `failed`;
//! - status changes go through [`advance_status`], which rejects anything the
//!   lifecycle does not allow;
//! - refunds credit the purchase amount, write the refund record and mark the
//!   purchase `refunded` in one unit of work.
//!
//! It is also the single place that hands committed records to the
//! [`EventNotifier`].

use crate::core::config::LedgerConfig;
use crate::core::notifier::EventNotifier;
use crate::core::retry::with_conflict_retry;
use crate::core::traits::{LedgerStore, TransactionFilter, UnitOfWork};
use crate::types::{
    LedgerError, NewTransaction, OrderId, PaymentEvent, ProductId, Transaction, TransactionId,
    TransactionStatus, TransactionType, UserId,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Move a record to `to`, enforcing the lifecycle
///
/// Takes the record's row lock. Callers that also touch wallets must have
/// locked them first.
///
/// # Errors
///
/// `InvalidStatusTransition` if the lifecycle forbids the move; the record is
/// left untouched.
pub fn advance_status(
    uow: &mut dyn UnitOfWork,
    tx_id: TransactionId,
    to: TransactionStatus,
) -> Result<Transaction, LedgerError> {
    let current = uow.lock_transaction(tx_id)?;

    if !current.status.can_transition_to(to, current.tx_type) {
        return Err(LedgerError::invalid_status_transition(
            tx_id,
            current.status,
            to,
        ));
    }

    uow.update_status(tx_id, to)
}

/// Refund preconditions, checked in a fixed order
fn ensure_refundable(tx: &Transaction) -> Result<(), LedgerError> {
    if tx.tx_type != TransactionType::Purchase {
        return Err(LedgerError::wrong_transaction_type(tx.id, tx.tx_type));
    }

    match tx.status {
        TransactionStatus::Completed => Ok(()),
        TransactionStatus::Refunded => Err(LedgerError::already_refunded(tx.id)),
        status => Err(LedgerError::invalid_status_transition(
            tx.id,
            status,
            TransactionStatus::Refunded,
        )),
    }
}

fn refund_description(tx_id: TransactionId, reason: &str) -> String {
    let reason = reason.trim();
    if reason.is_empty() {
        format!("Refund for transaction {}", tx_id)
    } else {
        format!("Refund for transaction {}: {}", tx_id, reason)
    }
}

/// Shared record keeping for every mutating component
pub struct TransactionLog<S> {
    store: Arc<S>,
    config: LedgerConfig,
    notifier: EventNotifier,
}

impl<S> Clone for TransactionLog<S> {
    fn clone(&self) -> Self {
        TransactionLog {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: LedgerStore> TransactionLog<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig, notifier: EventNotifier) -> Self {
        TransactionLog {
            store,
            config,
            notifier,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Commit a `pending` record on its own, ahead of the balance change
    ///
    /// The record survives whatever happens to the balance change, so every
    /// attempt leaves an audit trail.
    pub fn open_pending(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        let tx = with_conflict_retry(self.config.max_conflict_retries, "open_pending", || {
            self.store
                .atomically(|uow| uow.insert_transaction(new.clone()))
        })?;

        debug!(
            tx_id = tx.id,
            user_id = tx.user_id,
            wallet_id = tx.wallet_id,
            tx_type = %tx.tx_type,
            amount = %tx.amount,
            "pending transaction opened"
        );
        Ok(tx)
    }

    /// Mark pending records `failed` after their balance change was rolled back
    ///
    /// Best effort: a failure here is logged and swallowed so the caller still
    /// sees the original `cause`.
    pub fn mark_failed(&self, tx_ids: &[TransactionId], cause: &LedgerError) {
        let result = with_conflict_retry(self.config.max_conflict_retries, "mark_failed", || {
            self.store.atomically(|uow| {
                for &tx_id in tx_ids {
                    advance_status(uow, tx_id, TransactionStatus::Failed)?;
                }
                Ok(())
            })
        });

        match result {
            Ok(()) => debug!(?tx_ids, %cause, "transactions marked failed"),
            Err(e) => error!(
                ?tx_ids,
                %cause,
                error = %e,
                "failed to record failed transactions"
            ),
        }
    }

    /// Hand a committed record to the notifier
    pub fn publish(&self, tx: &Transaction) {
        self.notifier.notify(PaymentEvent::from(tx));
    }

    /// Refund a completed purchase
    ///
    /// Locks the purchase's wallet, then the purchase itself, and re-checks the
    /// preconditions under both locks. Credits the purchase amount, inserts a
    /// `completed` refund record and marks the purchase `refunded`, all in one
    /// unit of work. Returns the refund record.
    ///
    /// # Errors
    ///
    /// - `TransactionNotFound` if `tx_id` does not exist
    /// - `WrongTransactionType` if it is not a purchase
    /// - `AlreadyRefunded` if it was refunded before, including by a concurrent call
    /// - `InvalidStatusTransition` if the purchase never completed
    ///
    /// A refund whose preconditions fail writes nothing.
    pub fn refund(&self, tx_id: TransactionId, reason: &str) -> Result<Transaction, LedgerError> {
        let result = self.try_refund(tx_id, reason);

        match &result {
            Ok(refund) => {
                info!(
                    tx_id = refund.id,
                    refunded_tx = tx_id,
                    user_id = refund.user_id,
                    wallet_id = refund.wallet_id,
                    amount = %refund.amount,
                    "refund completed"
                );
                self.publish(refund);
            }
            Err(e) => warn!(tx_id, error = %e, "refund rejected"),
        }
        result
    }

    fn try_refund(&self, tx_id: TransactionId, reason: &str) -> Result<Transaction, LedgerError> {
        // Unlocked peek: finds the wallet to lock first and fails fast on
        // obviously bad requests
        let original = self
            .store
            .get_transaction(tx_id)?
            .ok_or_else(|| LedgerError::transaction_not_found(tx_id, "refund"))?;
        ensure_refundable(&original)?;

        let description = refund_description(tx_id, reason);

        with_conflict_retry(self.config.max_conflict_retries, "refund", || {
            self.store.atomically(|uow| {
                uow.lock_wallet(original.wallet_id)?;
                let purchase = uow.lock_transaction(tx_id)?;
                ensure_refundable(&purchase)?;

                uow.atomic_adjust(purchase.wallet_id, purchase.amount)?;
                let refund =
                    uow.insert_transaction(NewTransaction::refund_of(&purchase, description.clone()))?;
                advance_status(uow, tx_id, TransactionStatus::Refunded)?;
                Ok(refund)
            })
        })
    }

    /// A user's records, most recent first
    pub fn list_transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError> {
        self.store.list_transactions(TransactionFilter::User(user_id))
    }

    pub fn list_transactions_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.store
            .list_transactions(TransactionFilter::Product(product_id))
    }

    pub fn list_transactions_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.store.list_transactions(TransactionFilter::Order(order_id))
    }

    pub fn get_transaction(&self, tx_id: TransactionId) -> Result<Transaction, LedgerError> {
        self.store
            .get_transaction(tx_id)?
            .ok_or_else(|| LedgerError::transaction_not_found(tx_id, "get_transaction"))
    }
}

//! Two-wallet transfers
//!
//! A transfer debits one wallet and credits another in a single unit of work.
//! Both wallet rows are locked through `lock_ordered`, so they are always taken
//! in ascending wallet id order whichever side is the source. Two transfers
//! crossing the same pair in opposite directions therefore queue on the same
//! first lock instead of each holding one and waiting for the other.

use crate::core::retry::with_conflict_retry;
use crate::core::traits::LedgerStore;
use crate::core::transaction_log::{advance_status, TransactionLog};
use crate::types::{
    normalize_amount, LedgerError, NewTransaction, Transaction, TransactionStatus,
    TransactionType, UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Both legs of a completed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    /// Expense record on the source wallet
    pub debit: Transaction,
    /// Income record on the destination wallet
    pub credit: Transaction,
}

pub struct TransferCoordinator<S> {
    store: Arc<S>,
    log: TransactionLog<S>,
}

impl<S: LedgerStore> TransferCoordinator<S> {
    pub fn new(store: Arc<S>, log: TransactionLog<S>) -> Self {
        TransferCoordinator { store, log }
    }

    /// Move `amount` from one user's wallet to another's
    ///
    /// Both wallets are created if missing, the source included: a transfer
    /// from a user with no wallet fails with `InsufficientFunds` and leaves an
    /// empty wallet and two `failed` legs behind. Two `pending` records (expense
    /// on the source, income on the destination) are committed first; the
    /// balance changes and both `completed` transitions then commit together or
    /// not at all. On failure both records are marked `failed`.
    ///
    /// # Errors
    ///
    /// - `Validation` for a self-transfer or a bad amount (nothing is written)
    /// - `InsufficientFunds` if the source balance, checked under both locks,
    ///   is below `amount`
    /// - `StorageConflict` if the locks could not be taken within every retry
    pub fn transfer(
        &self,
        from_user: UserId,
        to_user: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        let amount = Self::validate(from_user, to_user, amount).inspect_err(|e| {
            warn!(from_user, to_user, error = %e, "transfer rejected");
        })?;

        let source = self.store.get_or_create_wallet(from_user)?;
        let destination = self.store.get_or_create_wallet(to_user)?;
        let retries = self.log.config().max_conflict_retries;

        let debit_new = NewTransaction::pending(
            from_user,
            source.id,
            TransactionType::Expense,
            amount,
            format!("Transfer to user {}: {}", to_user, description),
        );
        let credit_new = NewTransaction::pending(
            to_user,
            destination.id,
            TransactionType::Income,
            amount,
            format!("Transfer from user {}: {}", from_user, description),
        );

        let (debit, credit) = with_conflict_retry(retries, "open_transfer", || {
            self.store.atomically(|uow| {
                let debit = uow.insert_transaction(debit_new.clone())?;
                let credit = uow.insert_transaction(credit_new.clone())?;
                Ok((debit, credit))
            })
        })?;

        let result = with_conflict_retry(retries, "transfer", || {
            self.store.atomically(|uow| {
                let locked = uow.lock_ordered(&[source.id, destination.id])?;

                // Re-check under both locks; the balance read before locking is stale
                let balance = locked
                    .iter()
                    .find(|wallet| wallet.id == source.id)
                    .map(|wallet| wallet.balance)
                    .ok_or_else(|| LedgerError::unknown_wallet(source.id))?;
                if balance < amount {
                    return Err(LedgerError::insufficient_funds(source.id, balance, amount));
                }

                uow.atomic_adjust(source.id, -amount)?;
                uow.atomic_adjust(destination.id, amount)?;

                Ok(TransferReceipt {
                    debit: advance_status(uow, debit.id, TransactionStatus::Completed)?,
                    credit: advance_status(uow, credit.id, TransactionStatus::Completed)?,
                })
            })
        });

        match result {
            Ok(receipt) => {
                info!(
                    from_user,
                    to_user,
                    debit_tx = receipt.debit.id,
                    credit_tx = receipt.credit.id,
                    amount = %amount,
                    "transfer completed"
                );
                self.log.publish(&receipt.debit);
                self.log.publish(&receipt.credit);
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    from_user,
                    to_user,
                    debit_tx = debit.id,
                    credit_tx = credit.id,
                    amount = %amount,
                    error = %e,
                    "transfer failed"
                );
                self.log.mark_failed(&[debit.id, credit.id], &e);
                Err(e)
            }
        }
    }

    fn validate(from_user: UserId, to_user: UserId, amount: Decimal) -> Result<Decimal, LedgerError> {
        if from_user == to_user {
            return Err(LedgerError::validation("self-transfer"));
        }
        normalize_amount(amount, "amount")
    }
}

//! Ledger facade
//!
//! `Ledger` wires one store handle into the mutating components and exposes
//! the operations a caller (HTTP layer, batch replay) needs. It owns no state
//! of its own beyond those handles.

use crate::core::balance_mutator::BalanceMutator;
use crate::core::config::LedgerConfig;
use crate::core::memory_store::MemoryStore;
use crate::core::notifier::EventNotifier;
use crate::core::traits::{LedgerStore, TransactionFilter};
use crate::core::transaction_log::TransactionLog;
use crate::core::transfer_coordinator::{TransferCoordinator, TransferReceipt};
use crate::types::{
    LedgerError, OrderId, ProductId, PurchaseRequest, Transaction, TransactionId, UserId, Wallet,
    WalletId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of comparing a wallet's balance with its transaction history
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub balance: Decimal,
    /// Sum of the signed amounts of every record that moved the balance
    pub settled_sum: Decimal,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.settled_sum
    }
}

/// Wallet ledger over a shared store
pub struct Ledger<S> {
    store: Arc<S>,
    mutator: BalanceMutator<S>,
    transfers: TransferCoordinator<S>,
    log: TransactionLog<S>,
}

impl Ledger<MemoryStore> {
    /// A ledger over a fresh [`MemoryStore`] configured from `config`
    pub fn in_memory(config: LedgerConfig, notifier: EventNotifier) -> Self {
        let store = Arc::new(MemoryStore::with_config(&config));
        Ledger::new(store, config, notifier)
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig, notifier: EventNotifier) -> Self {
        let log = TransactionLog::new(Arc::clone(&store), config, notifier);

        Ledger {
            mutator: BalanceMutator::new(Arc::clone(&store), log.clone()),
            transfers: TransferCoordinator::new(Arc::clone(&store), log.clone()),
            log,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Return the user's wallet, creating an empty one if needed
    pub fn create_wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        let wallet = self.store.get_or_create_wallet(user_id)?;
        debug!(user_id, wallet_id = wallet.id, "wallet ready");
        Ok(wallet)
    }

    /// Committed state of the user's wallet
    ///
    /// A user seen for the first time gets an empty wallet, the same as on
    /// first deposit. Use [`find_wallet`](Self::find_wallet) for a read that
    /// never creates.
    pub fn get_wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        self.store.get_or_create_wallet(user_id)
    }

    /// Committed state of the user's wallet, if one exists
    pub fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, LedgerError> {
        self.store.find_wallet(user_id)
    }

    /// Every wallet, ordered by user id
    pub fn wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        self.store.list_wallets()
    }

    pub fn deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<Transaction, LedgerError> {
        self.mutator.deposit(user_id, amount, description)
    }

    pub fn withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<Transaction, LedgerError> {
        self.mutator.withdraw(user_id, amount, description)
    }

    pub fn purchase(&self, request: PurchaseRequest) -> Result<Transaction, LedgerError> {
        self.mutator.purchase(request)
    }

    pub fn transfer(
        &self,
        from_user: UserId,
        to_user: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        self.transfers
            .transfer(from_user, to_user, amount, description)
    }

    pub fn refund(&self, tx_id: TransactionId, reason: &str) -> Result<Transaction, LedgerError> {
        self.log.refund(tx_id, reason)
    }

    pub fn get_transaction(&self, tx_id: TransactionId) -> Result<Transaction, LedgerError> {
        self.log.get_transaction(tx_id)
    }

    /// A user's records, most recent first
    pub fn list_transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError> {
        self.log.list_transactions(user_id)
    }

    pub fn list_transactions_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.log.list_transactions_by_product(product_id)
    }

    pub fn list_transactions_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.log.list_transactions_by_order(order_id)
    }

    /// Every record in the ledger, most recent first
    pub fn all_transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        self.store.list_transactions(TransactionFilter::All)
    }

    /// Compare a wallet's balance with the records that moved it
    ///
    /// Reads committed state without locks, so the two sides only agree when
    /// no mutation on the wallet is in flight.
    ///
    /// # Errors
    ///
    /// `WalletNotFound` if the user has no wallet; reconciling never creates one.
    pub fn reconcile(&self, user_id: UserId) -> Result<Reconciliation, LedgerError> {
        let wallet = self
            .find_wallet(user_id)?
            .ok_or_else(|| LedgerError::wallet_not_found(user_id))?;

        let settled_sum = self
            .store
            .list_transactions(TransactionFilter::User(user_id))?
            .iter()
            .filter(|tx| tx.wallet_id == wallet.id && tx.status.has_balance_effect())
            .map(Transaction::signed_amount)
            .sum();

        let reconciliation = Reconciliation {
            user_id,
            wallet_id: wallet.id,
            balance: wallet.balance,
            settled_sum,
        };
        if !reconciliation.is_consistent() {
            warn!(
                user_id,
                wallet_id = wallet.id,
                balance = %reconciliation.balance,
                settled_sum = %reconciliation.settled_sum,
                "wallet does not reconcile"
            );
        }
        Ok(reconciliation)
    }
}

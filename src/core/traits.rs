//! Storage traits for wallets, transactions and units of work
//!
//! The ledger never touches rows directly. It talks to a [`LedgerStore`], which
//! offers plain reads plus [`LedgerStore::atomically`], the store's transaction:
//! inside the closure the caller gets a [`UnitOfWork`] that can take row locks,
//! adjust balances and write transaction records. The closure's writes become
//! visible together when it returns `Ok` and are discarded when it returns `Err`.
//!
//! # Lock order
//!
//! Within one unit of work, wallet rows are locked before transaction rows, and
//! several wallets are locked through [`WalletRepository::lock_ordered`], which
//! always acquires them by ascending `WalletId`. Every component follows this
//! order, so no two units of work can wait on each other in a cycle.

use crate::types::{
    LedgerError, NewTransaction, OrderId, ProductId, Transaction, TransactionId,
    TransactionStatus, UserId, Wallet, WalletId,
};
use rust_decimal::Decimal;

/// Row-locked wallet access inside a unit of work
pub trait WalletRepository {
    /// Take the exclusive row lock on a wallet and return its current state
    ///
    /// Re-entrant: locking a wallet this unit of work already holds returns the
    /// working copy, including uncommitted adjustments.
    fn lock_wallet(&mut self, wallet_id: WalletId) -> Result<Wallet, LedgerError>;

    /// Lock several wallets in canonical (ascending id) order
    ///
    /// The order of `wallet_ids` does not matter and duplicates are ignored.
    /// Wallets are returned in ascending id order.
    fn lock_ordered(&mut self, wallet_ids: &[WalletId]) -> Result<Vec<Wallet>, LedgerError>;

    /// Apply `delta` to a wallet's balance under its row lock
    ///
    /// Locks the wallet if needed, checks `balance + delta >= 0` and writes the
    /// new balance, all under the same lock. Returns the new balance.
    ///
    /// # Errors
    ///
    /// `InsufficientFunds` if the floor check fails; the balance is untouched.
    fn atomic_adjust(&mut self, wallet_id: WalletId, delta: Decimal)
        -> Result<Decimal, LedgerError>;
}

/// Transaction record writes inside a unit of work
pub trait TransactionRepository {
    /// Insert a new record and return it with its assigned id
    fn insert_transaction(&mut self, new: NewTransaction) -> Result<Transaction, LedgerError>;

    /// Take the exclusive row lock on a record and return its current state
    fn lock_transaction(&mut self, tx_id: TransactionId) -> Result<Transaction, LedgerError>;

    /// Overwrite a record's status
    ///
    /// No lifecycle checks happen here; see `transaction_log::advance_status`.
    fn update_status(
        &mut self,
        tx_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, LedgerError>;
}

/// Everything a closure passed to [`LedgerStore::atomically`] may do
pub trait UnitOfWork: WalletRepository + TransactionRepository {}

impl<T: WalletRepository + TransactionRepository + ?Sized> UnitOfWork for T {}

/// Selection for transaction listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionFilter {
    All,
    User(UserId),
    Product(ProductId),
    Order(OrderId),
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        match *self {
            TransactionFilter::All => true,
            TransactionFilter::User(user_id) => tx.user_id == user_id,
            TransactionFilter::Product(product_id) => tx.product_id == Some(product_id),
            TransactionFilter::Order(order_id) => tx.order_id == Some(order_id),
        }
    }
}

/// Durable wallet and transaction storage
///
/// Implementations provide the only serialization the ledger relies on: row
/// locks with a bounded wait, and all-or-nothing units of work.
pub trait LedgerStore: Send + Sync {
    /// Return the user's wallet, creating an empty one on first access
    ///
    /// Concurrent first accesses for the same user yield exactly one wallet.
    fn get_or_create_wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError>;

    /// Committed state of the user's wallet, if any
    fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, LedgerError>;

    /// Committed state of every wallet, ordered by user id
    fn list_wallets(&self) -> Result<Vec<Wallet>, LedgerError>;

    /// Committed state of a transaction record, if any
    fn get_transaction(&self, tx_id: TransactionId) -> Result<Option<Transaction>, LedgerError>;

    /// Committed records matching `filter`, most recent first
    fn list_transactions(&self, filter: TransactionFilter)
        -> Result<Vec<Transaction>, LedgerError>;

    /// Run `f` as a single unit of work
    ///
    /// Commits every write made through the unit of work if `f` returns `Ok`,
    /// discards all of them if it returns `Err`. Row locks taken inside `f` are
    /// held until then.
    fn atomically<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, LedgerError>;

    /// One-shot [`WalletRepository::atomic_adjust`] in its own unit of work
    fn atomic_adjust(&self, wallet_id: WalletId, delta: Decimal) -> Result<Decimal, LedgerError> {
        self.atomically(|uow| uow.atomic_adjust(wallet_id, delta))
    }

    /// One-shot [`WalletRepository::lock_ordered`]; the locks are released on return
    fn lock_ordered(&self, wallet_ids: &[WalletId]) -> Result<Vec<Wallet>, LedgerError> {
        self.atomically(|uow| uow.lock_ordered(wallet_ids))
    }
}

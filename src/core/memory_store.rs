//! Row-locking in-memory ledger store
//!
//! This module provides `MemoryStore`, the concrete [`LedgerStore`]. It keeps
//! wallets and transactions in `DashMap` tables and gives every row two parts:
//!
//! - an exclusive **row lock** (`parking_lot` mutex with a timed acquire), held
//!   by a unit of work from first touch until commit or rollback;
//! - a **committed snapshot** (`RwLock`), which plain reads clone without waiting
//!   on the row lock.
//!
//! A unit of work copies each row it locks into a private working copy and
//! buffers new records. Nothing becomes visible until commit, which writes the
//! working copies back while every row lock is still held. Rollback drops the
//! buffers. Readers therefore see read-committed state and never observe half of
//! a unit of work on any single row.
//!
//! # Lock waits
//!
//! A row lock is waited on for at most `lock_timeout`. Expiry fails the unit of
//! work with `StorageConflict`, which callers may retry.

use crate::core::config::LedgerConfig;
use crate::core::traits::{
    LedgerStore, TransactionFilter, TransactionRepository, UnitOfWork, WalletRepository,
};
use crate::types::{
    LedgerError, NewTransaction, Transaction, TransactionId, TransactionStatus, UserId, Wallet,
    WalletId,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type RowGuard = ArcMutexGuard<RawMutex, ()>;

/// A stored row: its exclusive lock and its last committed value
#[derive(Debug)]
struct Row<T> {
    lock: Arc<Mutex<()>>,
    committed: Arc<RwLock<T>>,
}

impl<T> Clone for Row<T> {
    fn clone(&self) -> Self {
        Row {
            lock: Arc::clone(&self.lock),
            committed: Arc::clone(&self.committed),
        }
    }
}

impl<T: Clone> Row<T> {
    fn new(value: T) -> Self {
        Row {
            lock: Arc::new(Mutex::new(())),
            committed: Arc::new(RwLock::new(value)),
        }
    }

    fn snapshot(&self) -> T {
        self.committed.read().clone()
    }

    fn acquire(&self, timeout: Duration) -> Option<RowGuard> {
        self.lock.try_lock_arc_for(timeout)
    }
}

/// A row held by a unit of work
struct Locked<T> {
    _guard: RowGuard,
    row: Row<T>,
    working: T,
    dirty: bool,
}

/// Thread-safe ledger store with row locks
///
/// `MemoryStore` is shared behind an `Arc` by every ledger component. All
/// methods take `&self`; concurrent callers serialize only on the rows they
/// actually lock.
#[derive(Debug)]
pub struct MemoryStore {
    /// Wallet rows by wallet id
    wallets: DashMap<WalletId, Row<Wallet>>,

    /// Unique index: user id to wallet id
    ///
    /// Wallet creation goes through this index's entry API, which makes the
    /// get-or-create an upsert.
    wallet_index: DashMap<UserId, WalletId>,

    /// Transaction rows by transaction id
    transactions: DashMap<TransactionId, Row<Transaction>>,

    wallet_seq: AtomicU64,
    transaction_seq: AtomicU64,

    /// Upper bound on any single row-lock wait
    lock_timeout: Duration,
}

impl MemoryStore {
    /// Create an empty store with the given lock-wait bound
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            wallets: DashMap::new(),
            wallet_index: DashMap::new(),
            transactions: DashMap::new(),
            wallet_seq: AtomicU64::new(0),
            transaction_seq: AtomicU64::new(0),
            lock_timeout,
        }
    }

    /// Create an empty store configured from a [`LedgerConfig`]
    pub fn with_config(config: &LedgerConfig) -> Self {
        Self::new(config.lock_timeout)
    }

    fn wallet_row(&self, wallet_id: WalletId) -> Option<Row<Wallet>> {
        self.wallets.get(&wallet_id).map(|entry| entry.value().clone())
    }

    fn transaction_row(&self, tx_id: TransactionId) -> Option<Row<Transaction>> {
        self.transactions.get(&tx_id).map(|entry| entry.value().clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_config(&LedgerConfig::default())
    }
}

impl LedgerStore for MemoryStore {
    fn get_or_create_wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        let wallet_id = *self.wallet_index.entry(user_id).or_insert_with(|| {
            let wallet_id = self.wallet_seq.fetch_add(1, Ordering::SeqCst) + 1;
            self.wallets
                .insert(wallet_id, Row::new(Wallet::new(wallet_id, user_id)));
            debug!(user_id, wallet_id, "wallet created");
            wallet_id
        });

        self.wallet_row(wallet_id)
            .map(|row| row.snapshot())
            .ok_or_else(|| LedgerError::unknown_wallet(wallet_id))
    }

    fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, LedgerError> {
        let wallet_id = match self.wallet_index.get(&user_id) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };

        Ok(self.wallet_row(wallet_id).map(|row| row.snapshot()))
    }

    fn list_wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        let mut wallets: Vec<Wallet> = self
            .wallets
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        wallets.sort_by_key(|wallet| wallet.user_id);
        Ok(wallets)
    }

    fn get_transaction(&self, tx_id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.transaction_row(tx_id).map(|row| row.snapshot()))
    }

    fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .map(|entry| entry.value().snapshot())
            .filter(|tx| filter.matches(tx))
            .collect();

        // Most recent first; ids break ties between records created in the same instant
        transactions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(transactions)
    }

    fn atomically<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, LedgerError>,
    {
        let mut uow = MemoryUnitOfWork::new(self);
        match f(&mut uow) {
            Ok(value) => {
                uow.commit();
                Ok(value)
            }
            Err(e) => {
                uow.rollback(&e);
                Err(e)
            }
        }
    }
}

/// One store transaction against a [`MemoryStore`]
///
/// Created by [`MemoryStore::atomically`]; not constructible elsewhere.
pub struct MemoryUnitOfWork<'s> {
    store: &'s MemoryStore,
    wallets: BTreeMap<WalletId, Locked<Wallet>>,
    transactions: BTreeMap<TransactionId, Locked<Transaction>>,
    inserted: Vec<Transaction>,
}

impl<'s> MemoryUnitOfWork<'s> {
    fn new(store: &'s MemoryStore) -> Self {
        Self {
            store,
            wallets: BTreeMap::new(),
            transactions: BTreeMap::new(),
            inserted: Vec::new(),
        }
    }

    /// Publish every write, then release every row lock
    fn commit(self) {
        let MemoryUnitOfWork {
            store,
            wallets,
            transactions,
            inserted,
        } = self;

        let inserted_count = inserted.len();
        for tx in inserted {
            store.transactions.insert(tx.id, Row::new(tx));
        }
        for locked in transactions.values().filter(|locked| locked.dirty) {
            *locked.row.committed.write() = locked.working.clone();
        }
        for locked in wallets.values().filter(|locked| locked.dirty) {
            *locked.row.committed.write() = locked.working.clone();
        }

        debug!(
            wallets = wallets.len(),
            transactions = transactions.len(),
            inserted = inserted_count,
            "unit of work committed"
        );
        // Row guards drop here, after every write above
    }

    /// Discard every buffered write and release every row lock
    fn rollback(self, cause: &LedgerError) {
        debug!(
            wallets = self.wallets.len(),
            discarded_inserts = self.inserted.len(),
            %cause,
            "unit of work rolled back"
        );
    }

    fn lock_timeout_error(kind: &str, id: u64) -> LedgerError {
        LedgerError::storage_conflict(format!("lock wait timeout on {} {}", kind, id))
    }
}

impl WalletRepository for MemoryUnitOfWork<'_> {
    fn lock_wallet(&mut self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        if let Some(locked) = self.wallets.get(&wallet_id) {
            return Ok(locked.working.clone());
        }

        if let Some((&highest, _)) = self.wallets.iter().next_back() {
            if highest > wallet_id {
                warn!(
                    wallet_id,
                    held = highest,
                    "wallet locked out of canonical order"
                );
            }
        }

        let row = self
            .store
            .wallet_row(wallet_id)
            .ok_or_else(|| LedgerError::unknown_wallet(wallet_id))?;
        let guard = row
            .acquire(self.store.lock_timeout)
            .ok_or_else(|| Self::lock_timeout_error("wallet", wallet_id))?;
        let working = row.snapshot();
        debug!(wallet_id, balance = %working.balance, "wallet row locked");

        self.wallets.insert(
            wallet_id,
            Locked {
                _guard: guard,
                row,
                working: working.clone(),
                dirty: false,
            },
        );
        Ok(working)
    }

    fn lock_ordered(&mut self, wallet_ids: &[WalletId]) -> Result<Vec<Wallet>, LedgerError> {
        let mut ordered = wallet_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        ordered
            .into_iter()
            .map(|wallet_id| self.lock_wallet(wallet_id))
            .collect()
    }

    fn atomic_adjust(
        &mut self,
        wallet_id: WalletId,
        delta: Decimal,
    ) -> Result<Decimal, LedgerError> {
        self.lock_wallet(wallet_id)?;
        let locked = self
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| LedgerError::unknown_wallet(wallet_id))?;

        let balance = locked.working.balance;
        let new_balance = balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::arithmetic_overflow("adjust", wallet_id))?;

        if new_balance < Decimal::ZERO {
            return Err(LedgerError::insufficient_funds(wallet_id, balance, -delta));
        }

        locked.working.balance = new_balance;
        locked.working.updated_at = Utc::now();
        locked.dirty = true;
        Ok(new_balance)
    }
}

impl TransactionRepository for MemoryUnitOfWork<'_> {
    fn insert_transaction(&mut self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        let tx_id = self.store.transaction_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let tx = Transaction::from_new(tx_id, new, Utc::now());
        self.inserted.push(tx.clone());
        Ok(tx)
    }

    fn lock_transaction(&mut self, tx_id: TransactionId) -> Result<Transaction, LedgerError> {
        if let Some(tx) = self.inserted.iter().find(|tx| tx.id == tx_id) {
            return Ok(tx.clone());
        }
        if let Some(locked) = self.transactions.get(&tx_id) {
            return Ok(locked.working.clone());
        }

        let row = self
            .store
            .transaction_row(tx_id)
            .ok_or_else(|| LedgerError::transaction_not_found(tx_id, "lock"))?;
        let guard = row
            .acquire(self.store.lock_timeout)
            .ok_or_else(|| Self::lock_timeout_error("transaction", tx_id))?;
        let working = row.snapshot();

        self.transactions.insert(
            tx_id,
            Locked {
                _guard: guard,
                row,
                working: working.clone(),
                dirty: false,
            },
        );
        Ok(working)
    }

    fn update_status(
        &mut self,
        tx_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, LedgerError> {
        if let Some(tx) = self.inserted.iter_mut().find(|tx| tx.id == tx_id) {
            tx.status = status;
            return Ok(tx.clone());
        }

        self.lock_transaction(tx_id)?;
        let locked = self
            .transactions
            .get_mut(&tx_id)
            .ok_or_else(|| LedgerError::transaction_not_found(tx_id, "update_status"))?;
        locked.working.status = status;
        locked.dirty = true;
        Ok(locked.working.clone())
    }
}

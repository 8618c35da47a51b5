//! Wallet Ledger Library
//! # Overview
//!
//! A concurrency-safe wallet ledger: per-user balances, an append-only record
//! of every money movement, and post-commit payment events. Balance changes
//! run inside units of work that hold row locks, so concurrent requests on the
//! same wallet serialize and a balance never goes negative.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Wallet, Transaction, LedgerError, etc.)
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Ledger components:
//!   - [`core::memory_store`] - Row-locking in-memory store with units of work
//!   - [`core::balance_mutator`] - Deposit, withdraw and purchase
//!   - [`core::transfer_coordinator`] - Two-wallet transfers in ascending lock order
//!   - [`core::transaction_log`] - Record lifecycle, refunds and listings
//!   - [`core::notifier`] - Fire-and-forget payment events
//!   - [`core::ledger`] - Facade exposing every operation
//! - [`io`] - CSV command parsing and report output
//! - [`strategy`] - Sequential and per-user-lane replay of command files
//!
//! # Transaction Lifecycle
//!
//! Every operation first records its transaction as `pending`, then moves it
//! to `completed` together with the balance change, or to `failed` when the
//! change is rejected. Completed purchases may later become `refunded`, at
//! which point a separate `refund` record carries the credit.

pub mod cli;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use crate::core::{EventNotifier, Ledger, LedgerConfig, LedgerStore, MemoryStore, Reconciliation};
pub use io::{write_transactions_csv, write_wallets_csv};
pub use types::{
    LedgerError, PaymentEvent, PurchaseRequest, Transaction, TransactionId, TransactionStatus,
    TransactionType, UserId, Wallet, WalletId,
};

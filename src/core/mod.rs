//! Core ledger module
//!
//! This module contains the ledger components, leaves first:
//! - `traits` - Store seams: repositories, unit of work, `LedgerStore`
//! - `memory_store` - Row-locking in-memory `LedgerStore`
//! - `config` - Shared tunables
//! - `retry` - Bounded retry of storage conflicts
//! - `notifier` - Post-commit event hand-off and relay
//! - `transaction_log` - Record lifecycle, refunds and listings
//! - `balance_mutator` - Deposit, withdraw and purchase
//! - `transfer_coordinator` - Deadlock-free two-wallet transfers
//! - `ledger` - Facade over all of the above

pub mod balance_mutator;
pub mod config;
pub mod ledger;
pub mod memory_store;
pub mod notifier;
pub mod retry;
pub mod traits;
pub mod transaction_log;
pub mod transfer_coordinator;

pub use balance_mutator::BalanceMutator;
pub use config::{LedgerConfig, DEFAULT_PAYMENT_TOPIC};
pub use ledger::{Ledger, Reconciliation};
pub use memory_store::{MemoryStore, MemoryUnitOfWork};
pub use notifier::{
    EventNotifier, EventPublisher, EventRelay, LoggingPublisher, PublishedMessage,
    RecordingPublisher, RelayStats,
};
pub use traits::{LedgerStore, TransactionFilter, TransactionRepository, UnitOfWork, WalletRepository};
pub use transaction_log::{advance_status, TransactionLog};
pub use transfer_coordinator::{TransferCoordinator, TransferReceipt};

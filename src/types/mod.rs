//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `wallet`: Wallet balance records
//! - `transaction`: Identifiers, transaction kinds/statuses and records
//! - `amount`: Fixed-point amount validation
//! - `event`: Post-commit event payload
//! - `error`: Error types for the ledger and event publishing

pub mod amount;
pub mod error;
pub mod event;
pub mod transaction;
pub mod wallet;

pub use amount::{normalize_amount, AMOUNT_SCALE};
pub use error::{LedgerError, PublishError};
pub use event::PaymentEvent;
pub use transaction::{
    NewTransaction, OrderId, ProductId, PurchaseRequest, Transaction, TransactionId,
    TransactionStatus, TransactionType, UserId, WalletId,
};
pub use wallet::Wallet;

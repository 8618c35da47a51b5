//! Error types for the wallet ledger
//!
//! This module defines all error types that can occur while mutating or
//! reading the ledger.
//!
//! # Error Categories
//!
//! - **Client errors**: validation failures, missing wallets or transactions,
//!   insufficient funds, refund precondition violations. Surfaced to callers as-is.
//! - **Storage errors**: lock-wait timeouts and serialization failures. Safe to
//!   retry; the ledger retries them a bounded number of times itself.
//! - **Publish errors**: event delivery failures. Kept in a separate type because
//!   they are observed after commit and never reach a mutation's caller.

use crate::types::{TransactionId, TransactionStatus, TransactionType, UserId, WalletId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for ledger operations
///
/// Every mutating operation is all-or-nothing: whenever one of these errors is
/// returned, wallet balances are exactly as they were before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Input rejected before touching the store
    ///
    /// Non-positive amounts, amounts with more than two fractional digits,
    /// zero quantities and self-transfers.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the rejected input
        message: String,
    },

    /// The user has no wallet
    #[error("Wallet not found for user {user_id}")]
    WalletNotFound {
        /// User whose wallet was requested
        user_id: UserId,
    },

    /// A wallet id referenced by a unit of work does not exist
    #[error("Wallet {wallet_id} does not exist")]
    UnknownWallet {
        /// Missing wallet id
        wallet_id: WalletId,
    },

    /// Transaction id does not exist
    #[error("Transaction {tx} not found for {operation}")]
    TransactionNotFound {
        /// Transaction ID that was not found
        tx: TransactionId,
        /// Operation that failed
        operation: String,
    },

    /// Balance floor would be violated
    ///
    /// Detected under the wallet's row lock, so the reported balance is the
    /// one the debit was actually checked against.
    #[error(
        "Insufficient funds in wallet {wallet_id}: balance {balance}, requested {requested}"
    )]
    InsufficientFunds {
        /// Wallet that would go negative
        wallet_id: WalletId,
        /// Balance at the time of the check
        balance: Decimal,
        /// Requested debit
        requested: Decimal,
    },

    /// Refund requested for a purchase that was already refunded
    #[error("Transaction {tx} has already been refunded")]
    AlreadyRefunded {
        /// The original purchase
        tx: TransactionId,
    },

    /// Refund requested for something other than a purchase
    #[error("Transaction {tx} is of type {tx_type}, only purchases can be refunded")]
    WrongTransactionType {
        /// The referenced transaction
        tx: TransactionId,
        /// Its actual type
        tx_type: TransactionType,
    },

    /// Lifecycle violation on a transaction record
    #[error("Transaction {tx} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        /// The transaction whose status was being advanced
        tx: TransactionId,
        /// Current status
        from: TransactionStatus,
        /// Requested status
        to: TransactionStatus,
    },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation} for wallet {wallet_id}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Wallet being adjusted
        wallet_id: WalletId,
    },

    /// Lock-wait timeout or serialization failure
    ///
    /// The unit of work was rolled back in full; retrying is safe.
    #[error("Storage conflict: {message}")]
    StorageConflict {
        /// What the store was waiting on
        message: String,
    },
}

impl LedgerError {
    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
        }
    }

    /// Create a WalletNotFound error
    pub fn wallet_not_found(user_id: UserId) -> Self {
        LedgerError::WalletNotFound { user_id }
    }

    /// Create an UnknownWallet error
    pub fn unknown_wallet(wallet_id: WalletId) -> Self {
        LedgerError::UnknownWallet { wallet_id }
    }

    /// Create a TransactionNotFound error
    pub fn transaction_not_found(tx: TransactionId, operation: &str) -> Self {
        LedgerError::TransactionNotFound {
            tx,
            operation: operation.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(wallet_id: WalletId, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            wallet_id,
            balance,
            requested,
        }
    }

    /// Create an AlreadyRefunded error
    pub fn already_refunded(tx: TransactionId) -> Self {
        LedgerError::AlreadyRefunded { tx }
    }

    /// Create a WrongTransactionType error
    pub fn wrong_transaction_type(tx: TransactionId, tx_type: TransactionType) -> Self {
        LedgerError::WrongTransactionType { tx, tx_type }
    }

    /// Create an InvalidStatusTransition error
    pub fn invalid_status_transition(
        tx: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Self {
        LedgerError::InvalidStatusTransition { tx, from, to }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, wallet_id: WalletId) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            wallet_id,
        }
    }

    /// Create a StorageConflict error
    pub fn storage_conflict(message: impl Into<String>) -> Self {
        LedgerError::StorageConflict {
            message: message.into(),
        }
    }

    /// Whether the failed operation may simply be run again
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageConflict { .. })
    }
}

/// Event delivery failure
///
/// Logged by the relay and dropped; a committed balance change is never
/// reversed because its event could not be published.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Payload could not be encoded
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// The broker or transport refused the message
    #[error("Failed to publish to topic {topic}: {message}")]
    Rejected {
        /// Destination topic
        topic: String,
        /// Transport-level reason
        message: String,
    },
}

impl PublishError {
    /// Create a Rejected error
    pub fn rejected(topic: &str, message: impl Into<String>) -> Self {
        PublishError::Rejected {
            topic: topic.to_string(),
            message: message.into(),
        }
    }
}

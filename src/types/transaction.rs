//! Transaction-related types for the wallet ledger
//!
//! This module defines identifiers, transaction kinds and statuses, the
//! persisted transaction record and the insert payload used to create one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User identifier (opaque positive integer)
pub type UserId = u64;

/// Wallet identifier, assigned by the store
pub type WalletId = u64;

/// Transaction identifier, assigned by the store from a monotonic sequence
pub type TransactionId = u64;

/// Product identifier carried by purchase and refund records
pub type ProductId = u64;

/// Order identifier carried by purchase and refund records
pub type OrderId = u64;

/// Kind of balance-affecting event a transaction records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credit: deposits and the receiving leg of a transfer
    Income,

    /// Debit: withdrawals and the sending leg of a transfer
    Expense,

    /// Debit for a product purchase; the only refundable kind
    Purchase,

    /// Credit returning the amount of an earlier purchase
    Refund,
}

impl TransactionType {
    /// Sign of this kind's effect on the wallet balance
    pub fn is_credit(self) -> bool {
        matches!(self, TransactionType::Income | TransactionType::Refund)
    }

    /// Apply this kind's sign to a positive amount
    pub fn signed(self, amount: Decimal) -> Decimal {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
            TransactionType::Purchase => "purchase",
            TransactionType::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a transaction record
///
/// ```text
/// pending ──► completed ──► refunded   (purchase only)
///    └──────► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    /// Whether a record of kind `tx_type` may move from `self` to `next`
    pub fn can_transition_to(self, next: TransactionStatus, tx_type: TransactionType) -> bool {
        match (self, next) {
            (TransactionStatus::Pending, TransactionStatus::Completed)
            | (TransactionStatus::Pending, TransactionStatus::Failed) => true,
            (TransactionStatus::Completed, TransactionStatus::Refunded) => {
                tx_type == TransactionType::Purchase
            }
            _ => false,
        }
    }

    /// Whether a record in this status has moved its wallet's balance
    ///
    /// A refunded purchase still counts: its debit stands and the separate
    /// refund record carries the credit.
    pub fn has_balance_effect(self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Refunded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted transaction record
///
/// Append-mostly: created `pending` (or directly `completed` for refunds),
/// advanced exactly once to a terminal state, and for purchases possibly
/// advanced once more to `refunded`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub tx_type: TransactionType,

    /// Always positive; the sign comes from `tx_type`
    pub amount: Decimal,

    pub description: String,
    pub status: TransactionStatus,
    pub product_id: Option<ProductId>,
    pub order_id: Option<OrderId>,
    pub quantity: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Materialize an insert payload with its store-assigned id
    pub fn from_new(id: TransactionId, new: NewTransaction, created_at: DateTime<Utc>) -> Self {
        Transaction {
            id,
            user_id: new.user_id,
            wallet_id: new.wallet_id,
            tx_type: new.tx_type,
            amount: new.amount,
            description: new.description,
            status: new.status,
            product_id: new.product_id,
            order_id: new.order_id,
            quantity: new.quantity,
            created_at,
        }
    }

    /// Effect of this record on its wallet's balance
    pub fn signed_amount(&self) -> Decimal {
        self.tx_type.signed(self.amount)
    }
}

/// Insert payload for a transaction record
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub product_id: Option<ProductId>,
    pub order_id: Option<OrderId>,
    pub quantity: Option<u32>,
}

impl NewTransaction {
    /// A `pending` record with no purchase linkage
    pub fn pending(
        user_id: UserId,
        wallet_id: WalletId,
        tx_type: TransactionType,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        NewTransaction {
            user_id,
            wallet_id,
            tx_type,
            amount,
            description: description.into(),
            status: TransactionStatus::Pending,
            product_id: None,
            order_id: None,
            quantity: None,
        }
    }

    /// Attach product, order and quantity
    pub fn with_purchase(mut self, product_id: ProductId, order_id: OrderId, quantity: u32) -> Self {
        self.product_id = Some(product_id);
        self.order_id = Some(order_id);
        self.quantity = Some(quantity);
        self
    }

    /// A `completed` refund crediting back `original`
    ///
    /// Copies the amount and the product/order/quantity linkage.
    pub fn refund_of(original: &Transaction, description: impl Into<String>) -> Self {
        NewTransaction {
            user_id: original.user_id,
            wallet_id: original.wallet_id,
            tx_type: TransactionType::Refund,
            amount: original.amount,
            description: description.into(),
            status: TransactionStatus::Completed,
            product_id: original.product_id,
            order_id: original.order_id,
            quantity: original.quantity,
        }
    }
}

/// Purchase parameters as received from the shop
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub order_id: OrderId,
}

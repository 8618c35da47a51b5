//! Post-commit event payload

use super::transaction::{OrderId, ProductId, Transaction, TransactionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Summary of a committed mutation, handed to the event publisher
///
/// `amount` is signed: positive for credits (income, refund), negative for
/// debits (expense, purchase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub user_id: UserId,
    pub amount: Decimal,
    pub transaction_id: TransactionId,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub product_id: Option<ProductId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quantity: Option<u32>,
}

impl PaymentEvent {
    /// Message key used when publishing this event
    pub fn key(&self) -> String {
        self.transaction_id.to_string()
    }
}

impl From<&Transaction> for PaymentEvent {
    fn from(tx: &Transaction) -> Self {
        PaymentEvent {
            user_id: tx.user_id,
            amount: tx.signed_amount(),
            transaction_id: tx.id,
            description: tx.description.clone(),
            product_id: tx.product_id,
            order_id: tx.order_id,
            quantity: tx.quantity,
        }
    }
}

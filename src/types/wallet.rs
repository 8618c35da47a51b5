//! Wallet-related types for the wallet ledger
//!
//! A wallet is the single balance record owned by a user. Wallets are created
//! lazily on first reference and are never deleted.

use super::transaction::{UserId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Per-user monetary balance
///
/// The balance is a fixed-point decimal with two fractional digits. It never
/// goes below zero: every change is applied by the store under the wallet's
/// row lock after a floor check.
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    /// Store-assigned wallet identifier
    ///
    /// Also the canonical ordering key for multi-wallet locking.
    pub id: WalletId,

    /// Owning user (unique across wallets)
    pub user_id: UserId,

    /// Current committed balance
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty wallet for a user
    ///
    /// # Returns
    ///
    /// A new Wallet with:
    /// - balance = 0.00
    /// - created_at = updated_at = now
    pub fn new(id: WalletId, user_id: UserId) -> Self {
        let now = Utc::now();
        Wallet {
            id,
            user_id,
            balance: Decimal::new(0, 2),
            created_at: now,
            updated_at: now,
        }
    }
}

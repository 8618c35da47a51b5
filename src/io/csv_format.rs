//! CSV format handling for ledger commands and report output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvCommand structure for deserialization
//! - Conversion from CSV commands to [`LedgerCommand`]
//! - Wallet and transaction report serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{OrderId, ProductId, PurchaseRequest, Transaction, UserId, Wallet};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns:
/// `type,user,to_user,tx,amount,product,quantity,order,description`.
/// Every column except `type` and `user` is optional; which ones a row needs
/// depends on its type.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvCommand {
    #[serde(rename = "type")]
    pub command: String,
    pub user: UserId,
    pub to_user: Option<UserId>,
    /// For `refund`: 1-based row number of the purchase being refunded
    pub tx: Option<u64>,
    pub amount: Option<String>,
    pub product: Option<ProductId>,
    pub quantity: Option<u32>,
    pub order: Option<OrderId>,
    pub description: Option<String>,
}

/// One ledger operation parsed from a CSV row
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    CreateWallet {
        user_id: UserId,
    },
    Deposit {
        user_id: UserId,
        amount: Decimal,
        description: String,
    },
    Withdraw {
        user_id: UserId,
        amount: Decimal,
        description: String,
    },
    Transfer {
        from_user: UserId,
        to_user: UserId,
        amount: Decimal,
        description: String,
    },
    Purchase(PurchaseRequest),
    Refund {
        /// Owner of the purchase
        user_id: UserId,
        /// Row number of the purchase command in the same input
        purchase_row: u64,
        reason: String,
    },
}

impl LedgerCommand {
    /// User whose lane the command runs in
    ///
    /// The initiating user: the source of a transfer, the purchase owner for a refund.
    pub fn lane(&self) -> UserId {
        match self {
            LedgerCommand::CreateWallet { user_id }
            | LedgerCommand::Deposit { user_id, .. }
            | LedgerCommand::Withdraw { user_id, .. }
            | LedgerCommand::Refund { user_id, .. } => *user_id,
            LedgerCommand::Transfer { from_user, .. } => *from_user,
            LedgerCommand::Purchase(request) => request.user_id,
        }
    }
}

fn required<T>(value: Option<T>, field: &str, command: &str, user: UserId) -> Result<T, String> {
    value.ok_or_else(|| format!("{} command for user {} requires {}", command, user, field))
}

fn parse_amount(amount: Option<String>, command: &str, user: UserId) -> Result<Decimal, String> {
    match amount {
        Some(amount_str) if !amount_str.trim().is_empty() => Decimal::from_str(amount_str.trim())
            .map_err(|_| format!("Invalid amount '{}' for user {}", amount_str, user)),
        _ => Err(format!(
            "{} command for user {} requires an amount",
            command, user
        )),
    }
}

/// Convert a CsvCommand to a LedgerCommand
///
/// This function:
/// - Parses the type string (case-insensitive)
/// - Parses the amount string into a Decimal
/// - Checks that the columns the type needs are present
///
/// Amount range and precision are left to the ledger, which rejects them with
/// a validation error.
///
/// # Returns
///
/// Result containing either:
/// - Ok(LedgerCommand) - Successfully converted command
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_command(csv_command: CsvCommand) -> Result<LedgerCommand, String> {
    let CsvCommand {
        command,
        user,
        to_user,
        tx,
        amount,
        product,
        quantity,
        order,
        description,
    } = csv_command;
    let kind = command.to_lowercase();
    let description = description.unwrap_or_default();

    match kind.as_str() {
        "create" => Ok(LedgerCommand::CreateWallet { user_id: user }),
        "deposit" => Ok(LedgerCommand::Deposit {
            user_id: user,
            amount: parse_amount(amount, &kind, user)?,
            description,
        }),
        "withdraw" => Ok(LedgerCommand::Withdraw {
            user_id: user,
            amount: parse_amount(amount, &kind, user)?,
            description,
        }),
        "transfer" => Ok(LedgerCommand::Transfer {
            from_user: user,
            to_user: required(to_user, "to_user", &kind, user)?,
            amount: parse_amount(amount, &kind, user)?,
            description,
        }),
        "purchase" => Ok(LedgerCommand::Purchase(PurchaseRequest {
            user_id: user,
            product_id: required(product, "product", &kind, user)?,
            quantity: required(quantity, "quantity", &kind, user)?,
            unit_price: parse_amount(amount, &kind, user)?,
            order_id: required(order, "order", &kind, user)?,
        })),
        "refund" => Ok(LedgerCommand::Refund {
            user_id: user,
            purchase_row: required(tx, "tx", &kind, user)?,
            reason: description,
        }),
        _ => Err(format!(
            "Invalid command type: '{}' for user {}",
            command, user
        )),
    }
}

/// Write wallet states to CSV format
///
/// Columns: user, balance. Wallets are sorted by user ID and balances carry
/// two decimal places. Wallet ids are left out: they follow creation order,
/// which concurrent replay does not fix.
pub fn write_wallets_csv(wallets: &[Wallet], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["user", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_wallets = wallets.to_vec();
    sorted_wallets.sort_by_key(|wallet| wallet.user_id);

    for wallet in sorted_wallets {
        writer
            .write_record(&[
                wallet.user_id.to_string(),
                format!("{:.2}", wallet.balance),
            ])
            .map_err(|e| format!("Failed to write wallet record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write transaction records to CSV format
///
/// Columns: id, user, wallet, type, amount, status, product, order, quantity,
/// description. Records are sorted by id; absent linkage fields are empty.
pub fn write_transactions_csv(
    transactions: &[Transaction],
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "id",
            "user",
            "wallet",
            "type",
            "amount",
            "status",
            "product",
            "order",
            "quantity",
            "description",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = transactions.to_vec();
    sorted.sort_by_key(|tx| tx.id);

    for tx in sorted {
        writer
            .write_record(&[
                tx.id.to_string(),
                tx.user_id.to_string(),
                tx.wallet_id.to_string(),
                tx.tx_type.to_string(),
                format!("{:.2}", tx.amount),
                tx.status.to_string(),
                optional(tx.product_id),
                optional(tx.order_id),
                optional(tx.quantity),
                tx.description,
            ])
            .map_err(|e| format!("Failed to write transaction record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

//! Replay strategy module
//!
//! This module defines the Strategy pattern for replaying a CSV command file
//! against a fresh ledger, encompassing CSV parsing, command execution and
//! report output. This allows different replay implementations (sequential,
//! concurrent per-user lanes) to be selected at runtime.

use crate::cli::{ReportKind, StrategyType};
use crate::core::{Ledger, LedgerConfig, LedgerStore};
use crate::io::csv_format::{write_transactions_csv, write_wallets_csv, LedgerCommand};
use crate::types::TransactionId;
use dashmap::DashMap;
use std::io::Write;
use std::path::Path;
use tracing::warn;

pub mod r#async;
pub mod sync;

pub use self::r#async::AsyncProcessingStrategy;
pub use sync::SyncProcessingStrategy;

/// Replay strategy trait
///
/// Each strategy reads ledger commands from a CSV file, executes them against
/// a ledger it creates, and writes the requested report to output.
pub trait ProcessingStrategy: Send + Sync {
    /// Replay commands from input file and write the report to output
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - The runtime cannot be created
    /// - Output cannot be written
    ///
    /// Rejected and malformed rows are logged and skipped; they never cause
    /// this method to return an error.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Configuration shared by every replay strategy
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    pub ledger: LedgerConfig,
    pub report: ReportKind,
    /// Upper bound on concurrently running lanes (async strategy only)
    pub workers: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            report: ReportKind::Wallets,
            workers: num_cpus::get(),
        }
    }
}

impl ReplayConfig {
    /// Create a ReplayConfig, falling back to the default for zero workers
    pub fn new(ledger: LedgerConfig, report: ReportKind, workers: usize) -> Self {
        let workers = if workers == 0 {
            let default = num_cpus::get();
            warn!(default, "invalid workers (0), using default");
            default
        } else {
            workers
        };

        Self {
            ledger,
            report,
            workers,
        }
    }
}

/// Create a replay strategy based on the specified strategy type
pub fn create_strategy(strategy_type: StrategyType, config: ReplayConfig) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(config)),
        StrategyType::Async => Box::new(AsyncProcessingStrategy::new(config)),
    }
}

/// Purchase row number to the ledger transaction it produced
pub(crate) type PurchaseIndex = DashMap<u64, TransactionId>;

/// Execute one command against the ledger
///
/// Successful purchases are recorded in `purchases` so later `refund` rows can
/// find them by row number.
pub(crate) fn execute<S: LedgerStore>(
    ledger: &Ledger<S>,
    purchases: &PurchaseIndex,
    row: u64,
    command: LedgerCommand,
) -> Result<(), String> {
    let result = match command {
        LedgerCommand::CreateWallet { user_id } => ledger.create_wallet(user_id).map(drop),
        LedgerCommand::Deposit {
            user_id,
            amount,
            description,
        } => ledger.deposit(user_id, amount, &description).map(drop),
        LedgerCommand::Withdraw {
            user_id,
            amount,
            description,
        } => ledger.withdraw(user_id, amount, &description).map(drop),
        LedgerCommand::Transfer {
            from_user,
            to_user,
            amount,
            description,
        } => ledger
            .transfer(from_user, to_user, amount, &description)
            .map(drop),
        LedgerCommand::Purchase(request) => ledger.purchase(request).map(|tx| {
            purchases.insert(row, tx.id);
        }),
        LedgerCommand::Refund {
            purchase_row,
            reason,
            ..
        } => {
            let tx_id = purchases
                .get(&purchase_row)
                .map(|entry| *entry.value())
                .ok_or_else(|| format!("row {} produced no purchase to refund", purchase_row))?;
            ledger.refund(tx_id, &reason).map(drop)
        }
    };

    result.map_err(|e| e.to_string())
}

/// Write the configured report for a finished replay
pub(crate) fn write_report<S: LedgerStore>(
    ledger: &Ledger<S>,
    report: ReportKind,
    output: &mut dyn Write,
) -> Result<(), String> {
    match report {
        ReportKind::Wallets => {
            let wallets = ledger.wallets().map_err(|e| e.to_string())?;
            write_wallets_csv(&wallets, output)
        }
        ReportKind::Transactions => {
            let transactions = ledger.all_transactions().map_err(|e| e.to_string())?;
            write_transactions_csv(&transactions, output)
        }
    }
}

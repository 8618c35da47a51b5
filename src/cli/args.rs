use crate::core::LedgerConfig;
use crate::strategy::ReplayConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Replay wallet ledger commands from a CSV file
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger")]
#[command(about = "Replay wallet ledger commands from a CSV file", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger commands
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Replay strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "sync",
        help = "Replay strategy: 'sync' for file order or 'async' for concurrent per-user lanes"
    )]
    pub strategy: StrategyType,

    /// Maximum number of lanes running concurrently (async mode only)
    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Maximum number of lanes running concurrently (default: CPU cores)"
    )]
    pub workers: Option<usize>,

    /// Row-lock wait bound
    #[arg(
        long = "lock-timeout-ms",
        value_name = "MS",
        help = "Longest a unit of work waits for a row lock, in milliseconds (default: 5000)"
    )]
    pub lock_timeout_ms: Option<u64>,

    /// Retries after a storage conflict
    #[arg(
        long = "max-retries",
        value_name = "COUNT",
        help = "Extra attempts after a storage conflict before giving up (default: 3)"
    )]
    pub max_retries: Option<u32>,

    /// Report written to stdout
    #[arg(
        long = "report",
        value_name = "REPORT",
        default_value = "wallets",
        help = "Report to print: 'wallets' for balances or 'transactions' for every record"
    )]
    pub report: ReportKind,
}

/// Available replay strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

/// Available output reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    Wallets,
    Transactions,
}

impl CliArgs {
    /// Create a LedgerConfig from CLI arguments
    ///
    /// Values not given on the command line fall back to the defaults; invalid
    /// values are replaced with a warning by `LedgerConfig::new`.
    pub fn to_ledger_config(&self) -> LedgerConfig {
        let default = LedgerConfig::default();

        if self.lock_timeout_ms.is_none() && self.max_retries.is_none() {
            return default;
        }

        LedgerConfig::new(
            self.lock_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.lock_timeout),
            self.max_retries.unwrap_or(default.max_conflict_retries),
            default.topic,
        )
    }

    /// Create a ReplayConfig from CLI arguments
    pub fn to_replay_config(&self) -> ReplayConfig {
        let workers = self.workers.unwrap_or_else(num_cpus::get);
        ReplayConfig::new(self.to_ledger_config(), self.report, workers)
    }
}

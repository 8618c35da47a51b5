//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (command conversion, report serialization)
//! - `sync_reader` - Synchronous CSV reader with iterator interface

pub mod csv_format;
pub mod sync_reader;

pub use csv_format::{
    convert_csv_command, write_transactions_csv, write_wallets_csv, CsvCommand, LedgerCommand,
};
pub use sync_reader::{CommandRow, SyncReader};

//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over ledger commands from a CSV file.
//! Delegates CSV format concerns to the csv_format module.
//!
//! # Iterator Interface
//!
//! SyncReader implements the Iterator trait, yielding a [`CommandRow`] for
//! each CSV row: its 1-based row number (header excluded) and the parsed
//! command or an error message.
//!
//! ```no_run
//! use wallet_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("commands.csv")).unwrap();
//! for row in reader {
//!     match row.command {
//!         Ok(command) => println!("row {}: {:?}", row.row, command),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual record parsing errors are yielded as Err variants in the iterator
//! - Line numbers are included in error messages for debugging

use crate::io::csv_format::{convert_csv_command, CsvCommand, LedgerCommand};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

/// One data row of the input
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRow {
    /// 1-based row number, header excluded; `refund` rows refer to purchases by it
    pub row: u64,
    pub command: Result<LedgerCommand, String>,
}

/// Synchronous CSV reader
///
/// Provides an iterator interface over ledger commands.
/// Maintains streaming behavior with constant memory usage.
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    row: u64,
}

impl SyncReader {
    /// Create a new SyncReader from a file path
    ///
    /// The CSV reader is configured to:
    /// - Trim whitespace from all fields
    /// - Allow flexible field counts (trailing optional columns may be omitted)
    /// - Use an 8KB buffer for efficient I/O
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if file opened successfully
    /// * `Err(String)` if file could not be opened
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self { reader, row: 0 })
    }
}

impl Iterator for SyncReader {
    type Item = CommandRow;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvCommand>();
        let parsed = deserializer.next()?;

        self.row += 1;
        let line = self.row + 1;
        let command = match parsed {
            Ok(csv_command) => {
                convert_csv_command(csv_command).map_err(|e| format!("Line {}: {}", line, e))
            }
            Err(e) => Err(format!("Line {}: CSV parse error: {}", line, e)),
        };

        Some(CommandRow {
            row: self.row,
            command,
        })
    }
}

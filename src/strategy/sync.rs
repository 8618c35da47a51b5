//! Sequential replay strategy
//!
//! This module provides a single-threaded implementation of the
//! ProcessingStrategy trait. Rows are executed in file order, so the outcome
//! of every row is fully determined by the rows before it.
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Ledger operations to `Ledger`
//! - CSV output to the `csv_format` report writers
//!
//! Payment events are queued while the rows run and published once the replay
//! is finished, on a current-thread runtime that exists only for that drain.

use crate::core::{EventNotifier, Ledger, LoggingPublisher};
use crate::io::sync_reader::SyncReader;
use crate::strategy::{execute, write_report, ProcessingStrategy, PurchaseIndex, ReplayConfig};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Sequential replay strategy
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    config: ReplayConfig,
}

impl SyncProcessingStrategy {
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Replay commands in file order and write the report
    ///
    /// 1. Creates a ledger over a fresh in-memory store
    /// 2. Iterates through rows, executing each against the ledger
    /// 3. Writes the configured report to output
    /// 4. Drains queued payment events to the logging publisher
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let (notifier, relay) = EventNotifier::channel(self.config.ledger.topic.clone());
        let ledger = Ledger::in_memory(self.config.ledger.clone(), notifier);
        let purchases = PurchaseIndex::new();

        let reader = SyncReader::new(input_path)?;

        let mut rejected = 0usize;
        for command_row in reader {
            let outcome = command_row
                .command
                .and_then(|command| execute(&ledger, &purchases, command_row.row, command));

            if let Err(e) = outcome {
                rejected += 1;
                warn!(row = command_row.row, error = %e, "row skipped");
            }
        }

        write_report(&ledger, self.config.report, output)?;
        drop(ledger);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;
        let stats = runtime.block_on(relay.run(Arc::new(LoggingPublisher)));

        info!(
            rejected,
            published = stats.published,
            "replay finished"
        );
        Ok(())
    }
}

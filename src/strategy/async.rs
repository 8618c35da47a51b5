//! Concurrent per-user lane replay strategy
//!
//! This module provides a multi-threaded implementation of the
//! ProcessingStrategy trait. Rows are partitioned into lanes by initiating
//! user; each lane runs its rows in file order while different lanes run
//! concurrently against the same ledger.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── ReplayConfig (ledger config, report, workers)
//!     ├── SyncReader (row parsing)
//!     ├── partition_by_user (lanes)
//!     ├── tokio multi-thread runtime
//!     │     ├── spawn_blocking per lane, bounded by a semaphore of `workers`
//!     │     └── EventRelay task
//!     └── Arc<Ledger> shared by every lane
//! ```
//!
//! Transfers from one lane credit wallets another lane may be debiting, so
//! lanes genuinely contend on wallet rows. Correctness under that contention
//! comes from the ledger's row locks, not from the lane split.

use crate::core::{EventNotifier, Ledger, LoggingPublisher, MemoryStore};
use crate::io::csv_format::LedgerCommand;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{execute, write_report, ProcessingStrategy, PurchaseIndex, ReplayConfig};
use crate::types::UserId;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Rows of one lane, in file order
type Lane = Vec<(u64, LedgerCommand)>;

/// Concurrent replay strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: ReplayConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }
}

/// Split parsed rows into per-user lanes
///
/// Rows keep their file order within a lane. Malformed rows are logged and
/// dropped; the count of dropped rows is returned alongside the lanes.
fn partition_by_user(reader: SyncReader) -> (HashMap<UserId, Lane>, usize) {
    let mut lanes: HashMap<UserId, Lane> = HashMap::new();
    let mut malformed = 0;

    for command_row in reader {
        match command_row.command {
            Ok(command) => lanes
                .entry(command.lane())
                .or_default()
                .push((command_row.row, command)),
            Err(e) => {
                malformed += 1;
                warn!(row = command_row.row, error = %e, "row skipped");
            }
        }
    }

    (lanes, malformed)
}

/// Run one lane's rows in order; returns how many were rejected
fn run_lane(ledger: &Ledger<MemoryStore>, purchases: &PurchaseIndex, lane: Lane) -> usize {
    let mut rejected = 0;

    for (row, command) in lane {
        if let Err(e) = execute(ledger, purchases, row, command) {
            rejected += 1;
            warn!(row, error = %e, "row skipped");
        }
    }

    rejected
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Replay commands in concurrent per-user lanes and write the report
    ///
    /// 1. Parses the file and partitions rows into lanes
    /// 2. Creates a tokio multi-thread runtime and starts the event relay
    /// 3. Runs each lane on the blocking pool, at most `workers` at a time
    /// 4. Waits for every lane, then writes the configured report
    /// 5. Closes the notifier and waits for the relay to drain
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let reader = SyncReader::new(input_path)?;
        let (lanes, malformed) = partition_by_user(reader);
        let workers = self.config.workers;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(workers)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let (notifier, relay) = EventNotifier::channel(self.config.ledger.topic.clone());
            let relay = relay.spawn(Arc::new(LoggingPublisher));

            let ledger = Arc::new(Ledger::in_memory(self.config.ledger.clone(), notifier));
            let purchases = Arc::new(PurchaseIndex::new());
            let permits = Arc::new(Semaphore::new(workers));

            debug!(lanes = lanes.len(), workers, "starting lanes");

            let mut tasks = Vec::with_capacity(lanes.len());
            for (user_id, lane) in lanes {
                let permit = Arc::clone(&permits)
                    .acquire_owned()
                    .await
                    .map_err(|e| format!("Lane scheduler closed: {}", e))?;
                let ledger = Arc::clone(&ledger);
                let purchases = Arc::clone(&purchases);

                tasks.push((
                    user_id,
                    tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        run_lane(&ledger, &purchases, lane)
                    }),
                ));
            }

            let mut rejected = malformed;
            for (user_id, task) in tasks {
                match task.await {
                    Ok(lane_rejected) => rejected += lane_rejected,
                    Err(e) => error!(user_id, error = %e, "lane task panicked"),
                }
            }

            write_report(&*ledger, self.config.report, output)?;

            // Every lane has finished, so this is the last handle to the notifier
            drop(ledger);
            let stats = relay
                .await
                .map_err(|e| format!("Event relay failed: {}", e))?;

            info!(
                rejected,
                published = stats.published,
                failed = stats.failed,
                "replay finished"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ReportKind;
    use crate::core::LedgerConfig;
    use tempfile::NamedTempFile;

    const HEADER: &str = "type,user,to_user,tx,amount,product,quantity,order,description\n";

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(file, "{}{}", HEADER, rows).expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn strategy(workers: usize) -> AsyncProcessingStrategy {
        AsyncProcessingStrategy::new(ReplayConfig::new(
            LedgerConfig::default(),
            ReportKind::Wallets,
            workers,
        ))
    }

    #[test]
    fn test_partition_keeps_file_order_per_user() {
        let file = create_temp_csv(
            "deposit,1,,,10.00,,,,a\n\
             deposit,2,,,20.00,,,,b\n\
             bogus,2,,,1.00,,,,\n\
             transfer,1,2,,5.00,,,,c\n",
        );

        let (lanes, malformed) = partition_by_user(SyncReader::new(file.path()).unwrap());

        assert_eq!(malformed, 1);
        assert_eq!(lanes.len(), 2);
        let rows: Vec<u64> = lanes[&1].iter().map(|(row, _)| *row).collect();
        assert_eq!(rows, vec![1, 4]);
        assert_eq!(lanes[&2].len(), 1);
    }

    #[test]
    fn test_async_strategy_independent_lanes() {
        let file = create_temp_csv(
            "deposit,1,,,100.00,,,,\n\
             deposit,2,,,50.00,,,,\n\
             withdraw,1,,,30.00,,,,\n\
             purchase,2,,,10.00,7,2,9,\n\
             refund,2,,4,,,,,\n\
             withdraw,2,,,500.00,,,,\n",
        );

        let mut output = Vec::new();
        strategy(4).process(file.path(), &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "user,balance\n1,70.00\n2,50.00\n"
        );
    }

    #[test]
    fn test_async_strategy_single_worker() {
        let file = create_temp_csv(
            "deposit,1,,,100.00,,,,\n\
             transfer,1,2,,40.00,,,,\n\
             deposit,3,,,5.00,,,,\n",
        );

        let mut output = Vec::new();
        strategy(1).process(file.path(), &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "user,balance\n1,60.00\n2,40.00\n3,5.00\n"
        );
    }
}

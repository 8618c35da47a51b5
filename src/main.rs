//! Wallet ledger CLI
//!
//! Replays a CSV file of ledger commands against a fresh in-memory ledger.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > wallets.csv
//! cargo run -- --strategy async --workers 8 commands.csv > wallets.csv
//! cargo run -- --report transactions commands.csv > transactions.csv
//! RUST_LOG=wallet_ledger=debug cargo run -- commands.csv
//! ```
//!
//! The report goes to stdout; logs go to stderr. Rejected rows are logged and
//! skipped, they never abort the replay.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use std::io;
use std::process;
use wallet_ledger::{cli, strategy};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = cli::parse_args();
    let strategy = strategy::create_strategy(args.strategy, args.to_replay_config());

    let mut output = io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

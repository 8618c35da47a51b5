//! Ledger configuration

use std::time::Duration;
use tracing::warn;

/// Topic payment events are published on unless configured otherwise
pub const DEFAULT_PAYMENT_TOPIC: &str = "wallet.payment";

/// Tunables shared by the store and every ledger component
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    /// Longest a unit of work waits for any single row lock
    pub lock_timeout: Duration,
    /// Extra attempts after a `StorageConflict` before it is surfaced
    pub max_conflict_retries: u32,
    /// Destination topic for payment events
    pub topic: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            max_conflict_retries: 3,
            topic: DEFAULT_PAYMENT_TOPIC.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Create a LedgerConfig with custom values
    ///
    /// A zero lock timeout or an empty topic falls back to the default with a
    /// warning. Zero retries is valid and disables retrying.
    pub fn new(lock_timeout: Duration, max_conflict_retries: u32, topic: impl Into<String>) -> Self {
        let default = Self::default();

        let lock_timeout = if lock_timeout.is_zero() {
            warn!(
                default_ms = default.lock_timeout.as_millis() as u64,
                "invalid lock_timeout (0), using default"
            );
            default.lock_timeout
        } else {
            lock_timeout
        };

        let topic = topic.into();
        let topic = if topic.trim().is_empty() {
            warn!(default = %default.topic, "empty topic, using default");
            default.topic
        } else {
            topic
        };

        Self {
            lock_timeout,
            max_conflict_retries,
            topic,
        }
    }
}

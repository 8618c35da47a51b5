//! Post-commit event notification
//!
//! Mutations hand a [`PaymentEvent`] to an [`EventNotifier`] only after their
//! unit of work has committed. The notifier pushes the event onto an unbounded
//! channel and returns immediately; it never blocks and never holds a row lock.
//!
//! An [`EventRelay`] drains the channel on a tokio task, encodes each event as
//! JSON and hands it to an [`EventPublisher`]. Delivery is best-effort: a
//! failed publish is logged and counted, never retried here and never allowed
//! to undo the committed balance change.
//!
//! ```text
//! BalanceMutator / TransferCoordinator / TransactionLog
//!     └── EventNotifier ──(mpsc)──► EventRelay ──► EventPublisher
//! ```

use crate::types::{PaymentEvent, PublishError};
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Destination for encoded payment events (a message bus producer)
pub trait EventPublisher: Send + Sync + 'static {
    /// Publish one message
    ///
    /// At-least-once semantics are the publisher's concern; the relay calls
    /// this exactly once per event.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), PublishError>>;
}

/// Sending half handed to every mutating component
#[derive(Debug, Clone)]
pub struct EventNotifier {
    sender: Option<mpsc::UnboundedSender<PaymentEvent>>,
}

impl EventNotifier {
    /// Create a notifier and the relay that drains it
    pub fn channel(topic: impl Into<String>) -> (Self, EventRelay) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            EventRelay {
                receiver,
                topic: topic.into(),
            },
        )
    }

    /// A notifier that discards every event
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Queue an event for publication
    ///
    /// Never blocks. If the relay has gone away the event is dropped with a warning.
    pub fn notify(&self, event: PaymentEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        let transaction_id = event.transaction_id;
        if sender.send(event).is_err() {
            warn!(transaction_id, "event relay closed, dropping payment event");
        }
    }
}

/// Counters reported when a relay finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub published: u64,
    pub failed: u64,
}

/// Receiving half: publishes queued events until every notifier is dropped
#[derive(Debug)]
pub struct EventRelay {
    receiver: mpsc::UnboundedReceiver<PaymentEvent>,
    topic: String,
}

impl EventRelay {
    /// Publish events until the channel closes
    pub async fn run<P: EventPublisher>(mut self, publisher: Arc<P>) -> RelayStats {
        let mut stats = RelayStats::default();

        while let Some(event) = self.receiver.recv().await {
            let key = event.key();
            let result = match serde_json::to_vec(&event) {
                Ok(payload) => publisher.publish(&self.topic, &key, &payload).await,
                Err(e) => Err(PublishError::from(e)),
            };

            match result {
                Ok(()) => {
                    stats.published += 1;
                    debug!(topic = %self.topic, key = %key, "payment event published");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        topic = %self.topic,
                        key = %key,
                        user_id = event.user_id,
                        error = %e,
                        "failed to publish payment event"
                    );
                }
            }
        }

        info!(
            published = stats.published,
            failed = stats.failed,
            "event relay stopped"
        );
        stats
    }

    /// Run the relay on the current tokio runtime
    pub fn spawn<P: EventPublisher>(self, publisher: Arc<P>) -> JoinHandle<RelayStats> {
        tokio::spawn(self.run(publisher))
    }
}

/// Publisher that writes each event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPublisher;

impl EventPublisher for LoggingPublisher {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), PublishError>> {
        info!(
            topic,
            key,
            payload = %String::from_utf8_lossy(payload),
            "payment event"
        );
        Box::pin(future::ready(Ok(())))
    }
}

/// A message captured by [`RecordingPublisher`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Decode the payload back into an event
    pub fn event(&self) -> Result<PaymentEvent, PublishError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Publisher that keeps every message in memory
///
/// Can be switched into a failing mode to exercise the delivery-failure path.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    failing: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every publish is rejected
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), PublishError>> {
        let result = if self.failing {
            Err(PublishError::rejected(topic, "broker unavailable"))
        } else {
            self.messages.lock().push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                payload: payload.to_vec(),
            });
            Ok(())
        };
        Box::pin(future::ready(result))
    }
}

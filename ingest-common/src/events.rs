//! Event types and EventBus for catalog-ingest
//!
//! Status notifications are broadcast in-process over the EventBus and
//! forwarded to out-of-process observers by whoever subscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Item counts reported by the external import worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Total items in the metadata file, if the worker knows it yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Items processed successfully
    #[serde(default)]
    pub completed: u64,
    /// Items that failed
    #[serde(default)]
    pub failed: u64,
}

/// catalog-ingest event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IngestEvent {
    /// Current status of an import job, pushed on request
    ImportJobStatus {
        job_id: Uuid,
        state: String,
        status_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<JobProgress>,
        timestamp: DateTime<Utc>,
    },
}

impl IngestEvent {
    /// Event type name, used as the event label on status channels
    pub fn event_type(&self) -> &'static str {
        match self {
            IngestEvent::ImportJobStatus { .. } => "ImportJobStatus",
        }
    }

    /// Job the event refers to
    pub fn job_id(&self) -> Uuid {
        match self {
            IngestEvent::ImportJobStatus { job_id, .. } => *job_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// see `Lagged` instead of stalling producers, and receivers clean up when
/// dropped.
///
/// # Examples
///
/// ```
/// use ingest_common::events::EventBus;
///
/// let event_bus = EventBus::new(100);
/// let _rx = event_bus.subscribe();
/// assert_eq!(event_bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IngestEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IngestEvent,
    ) -> Result<usize, broadcast::error::SendError<IngestEvent>> {
        self.tx.send(event)
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

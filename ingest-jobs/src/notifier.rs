//! Job status notifications
//!
//! A status request reads the job and broadcasts its current status. Nothing
//! here writes to the job record.

use chrono::Utc;
use ingest_common::events::{EventBus, IngestEvent};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::JobResult;
use crate::messaging::{MessageTransport, STATUS_TOPIC};
use crate::models::ImportJob;
use crate::request::HEADER_JOB_ID;

/// Status event for a job as it currently stands
pub fn status_event(job: &ImportJob) -> IngestEvent {
    IngestEvent::ImportJobStatus {
        job_id: job.id,
        state: job.state.to_string(),
        status_text: job.status_text(),
        progress: job.progress,
        timestamp: Utc::now(),
    }
}

/// Pushes job status to observers on request
#[derive(Clone)]
pub struct JobStatusNotifier {
    db: SqlitePool,
    event_bus: EventBus,
}

impl JobStatusNotifier {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Broadcast the current status of `job_id` in the background
    ///
    /// Fails only if the job cannot be loaded. The returned handle lets
    /// short-lived callers wait for the broadcast.
    pub async fn request_status_update(&self, job_id: Uuid) -> JobResult<JoinHandle<()>> {
        let job = crate::db::jobs::find_job(&self.db, job_id).await?;
        let event_bus = self.event_bus.clone();

        Ok(tokio::spawn(async move {
            match event_bus.emit(status_event(&job)) {
                Ok(subscribers) => {
                    debug!(job_id = %job.id, subscribers, "Job status broadcast");
                }
                Err(_) => {
                    debug!(job_id = %job.id, "No status subscribers, notification dropped");
                }
            }
        }))
    }
}

/// Forwards status events from the EventBus to the broker's status topic
pub struct StatusRelay;

impl StatusRelay {
    /// Subscribe now and forward in a background task
    ///
    /// Subscribing before spawning means no event emitted after this call
    /// returns is missed.
    pub fn spawn(event_bus: &EventBus, transport: Arc<dyn MessageTransport>) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(run_status_relay(rx, transport))
    }
}

/// Runs until the EventBus is dropped
pub async fn run_status_relay(
    mut rx: broadcast::Receiver<IngestEvent>,
    transport: Arc<dyn MessageTransport>,
) {
    debug!("Status relay started");

    loop {
        match rx.recv().await {
            Ok(event) => {
                let body = match serde_json::to_string(&event) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Status relay: failed to serialize {}: {}", event.event_type(), e);
                        continue;
                    }
                };
                let mut headers = BTreeMap::new();
                headers.insert(HEADER_JOB_ID.to_string(), event.job_id().to_string());
                headers.insert("event".to_string(), event.event_type().to_string());

                if !transport.publish(STATUS_TOPIC, &body, &headers).await {
                    warn!(job_id = %event.job_id(), "Status relay: broker rejected status event");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Status relay: lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Status relay: event bus closed, stopping");
                break;
            }
        }
    }
}

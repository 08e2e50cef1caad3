//! ingest-jobs library interface
//!
//! Import job lifecycle: job records, the state machine deciding what each
//! action does, request encoding, delivery to the external worker over STOMP,
//! and status notifications.

pub mod config;
pub mod db;
pub mod error;
pub mod messaging;
pub mod models;
pub mod notifier;
pub mod request;
pub mod service;
pub mod state_machine;

pub use crate::error::{FieldError, JobError, JobResult};
pub use crate::service::{Caller, JobOutcome, JobService};
pub use crate::state_machine::{accept_report, guard, Dispatch, JobState, Rejection};

use ingest_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::messaging::{InMemoryTransport, MessageSubmitter, MessageTransport, StompTransport};

/// Status events buffered for slow observers
pub const EVENT_BUS_CAPACITY: usize = 100;

/// Shared handles for one process
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub transport: Arc<dyn MessageTransport>,
    pub service: JobService,
}

impl AppState {
    pub fn new(db: SqlitePool, transport: Arc<dyn MessageTransport>, config: &ServiceConfig) -> Self {
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
        let service = JobService::new(
            db.clone(),
            MessageSubmitter::new(Arc::clone(&transport)),
            event_bus.clone(),
            config.import.clone(),
        );
        Self {
            db,
            event_bus,
            transport,
            service,
        }
    }
}

/// Broker transport from configuration, or an in-memory one for dry runs
pub fn build_transport(config: &ServiceConfig, dry_run: bool) -> Arc<dyn MessageTransport> {
    if dry_run {
        tracing::info!("Dry run: messages are recorded, not sent");
        Arc::new(InMemoryTransport::new())
    } else {
        Arc::new(StompTransport::new(config.messaging.clone()))
    }
}

//! Delivery of job requests to the external worker
//!
//! A transport only reports whether the broker accepted a message; it never
//! waits for the worker to process it.

pub mod memory;
pub mod stomp;

pub use memory::{InMemoryTransport, PublishedMessage};
pub use stomp::StompTransport;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::request::JobRequest;

/// Logical topic for job requests
pub const JOBS_TOPIC: &str = "jobs";
/// Logical topic for status notifications
pub const STATUS_TOPIC: &str = "status";

/// Message broker seam
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Hand a message to the broker; `true` iff it was accepted
    async fn publish(&self, topic: &str, body: &str, headers: &BTreeMap<String, String>) -> bool;
}

/// The broker could not be reached or refused the message
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unable to deliver message to topic '{topic}'")]
pub struct MessagingError {
    pub topic: String,
}

impl MessagingError {
    /// Message shown to users when delivery fails
    pub const USER_MESSAGE: &'static str =
        "Unable to reach the message broker; please try again later";
}

/// Sends job requests to the `jobs` topic
///
/// No retries: retrying is a user action.
#[derive(Clone)]
pub struct MessageSubmitter {
    transport: Arc<dyn MessageTransport>,
}

impl MessageSubmitter {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self { transport }
    }

    pub async fn submit(&self, request: &JobRequest) -> Result<(), MessagingError> {
        if self
            .transport
            .publish(JOBS_TOPIC, &request.body, &request.headers)
            .await
        {
            Ok(())
        } else {
            Err(MessagingError {
                topic: JOBS_TOPIC.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        let mut headers = BTreeMap::new();
        headers.insert("ImportJobId".to_string(), "http://x/import_jobs/1".to_string());
        JobRequest {
            body: "uploads/a.csv".to_string(),
            headers,
        }
    }

    #[tokio::test]
    async fn test_submit_publishes_to_jobs_topic() {
        let transport = Arc::new(InMemoryTransport::new());
        let submitter = MessageSubmitter::new(transport.clone());

        submitter.submit(&request()).await.unwrap();

        let sent = transport.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, JOBS_TOPIC);
        assert_eq!(sent[0].body, "uploads/a.csv");
    }

    #[tokio::test]
    async fn test_rejected_publish_is_messaging_error() {
        let transport = Arc::new(InMemoryTransport::unavailable());
        let submitter = MessageSubmitter::new(transport.clone());

        let err = submitter.submit(&request()).await.unwrap_err();
        assert_eq!(err.topic, JOBS_TOPIC);
        assert!(transport.published().is_empty());
    }
}

//! In-process transport
//!
//! Records messages instead of sending them. Backs `--dry-run` and tests.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::MessageTransport;

/// Message captured by [`InMemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedMessage {
    pub topic: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct InMemoryTransport {
    messages: Mutex<Vec<PublishedMessage>>,
    unavailable: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that rejects every publish
    pub fn unavailable() -> Self {
        let transport = Self::default();
        transport.set_available(false);
        transport
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn publish(&self, topic: &str, body: &str, headers: &BTreeMap<String, String>) -> bool {
        if self.unavailable.load(Ordering::SeqCst) {
            tracing::warn!(topic, "In-memory transport unavailable, message dropped");
            return false;
        }

        match self.messages.lock() {
            Ok(mut messages) => {
                messages.push(PublishedMessage {
                    topic: topic.to_string(),
                    body: body.to_string(),
                    headers: headers.clone(),
                });
                tracing::debug!(topic, "Message recorded by in-memory transport");
                true
            }
            Err(_) => false,
        }
    }
}

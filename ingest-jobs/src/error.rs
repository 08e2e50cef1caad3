//! Error types for ingest-jobs
//!
//! Messaging failures are not errors at this level: they become an
//! `*_error` job state plus a warning on the outcome.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::state_machine::Rejection;

/// Field-level validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }

    pub fn required(field: &'static str) -> Self {
        Self::new(field, "is required")
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Job service error
#[derive(Debug, Error)]
pub enum JobError {
    /// Action not allowed from the job's current state
    #[error("{0}")]
    InvalidState(Rejection),

    /// Form fields failed validation; nothing was persisted
    #[error("Invalid job: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// No job with that identifier
    #[error("Import job not found: {0}")]
    NotFound(String),

    /// Caller may not view or act on the job
    #[error("Not permitted: {0}")]
    Forbidden(String),

    /// Persistence or other infrastructure failure
    #[error(transparent)]
    Store(ingest_common::Error),
}

impl From<ingest_common::Error> for JobError {
    fn from(err: ingest_common::Error) -> Self {
        match err {
            ingest_common::Error::NotFound(what) => JobError::NotFound(what),
            other => JobError::Store(other),
        }
    }
}

impl From<Rejection> for JobError {
    fn from(rejection: Rejection) -> Self {
        JobError::InvalidState(rejection)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for job service operations
pub type JobResult<T> = Result<T, JobError>;

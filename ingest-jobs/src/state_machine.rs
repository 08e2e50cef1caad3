//! Import job state machine
//!
//! A job moves through a validation phase and an import phase:
//!
//! ```text
//! VALIDATE_PENDING ─worker─▶ VALIDATE_SUCCESS ─import─▶ IMPORT_PENDING ─worker─▶ IMPORT_COMPLETE
//!        │                  VALIDATE_FAILED                   │
//!        └─broker down─▶ VALIDATE_ERROR                       ├─worker─▶ IMPORT_INCOMPLETE ─resume─▶ IMPORT_PENDING
//!                                                             └─broker down─▶ IMPORT_ERROR
//! ```
//!
//! Pending outcomes are reported by the external worker; everything else is
//! decided here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::request::RequestMode;

/// Import job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum JobState {
    /// Validation requested, waiting for the worker
    ValidatePending,
    /// Worker accepted the metadata file
    ValidateSuccess,
    /// Worker rejected the metadata file
    ValidateFailed,
    /// Validation request could not be delivered
    ValidateError,
    /// Import requested, waiting for the worker
    ImportPending,
    /// Worker imported some but not all items
    ImportIncomplete,
    /// Import request could not be delivered
    ImportError,
    /// Worker imported every item
    ImportComplete,
}

impl JobState {
    pub const ALL: [JobState; 8] = [
        JobState::ValidatePending,
        JobState::ValidateSuccess,
        JobState::ValidateFailed,
        JobState::ValidateError,
        JobState::ImportPending,
        JobState::ImportIncomplete,
        JobState::ImportError,
        JobState::ImportComplete,
    ];

    /// Stored/displayed name (snake_case)
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::ValidatePending => "validate_pending",
            JobState::ValidateSuccess => "validate_success",
            JobState::ValidateFailed => "validate_failed",
            JobState::ValidateError => "validate_error",
            JobState::ImportPending => "import_pending",
            JobState::ImportIncomplete => "import_incomplete",
            JobState::ImportError => "import_error",
            JobState::ImportComplete => "import_complete",
        }
    }

    /// Human-readable label for the state
    pub fn label(&self) -> &'static str {
        match self {
            JobState::ValidatePending => "Validation Pending",
            JobState::ValidateSuccess => "Validation Succeeded",
            JobState::ValidateFailed => "Validation Failed",
            JobState::ValidateError => "Validation Error",
            JobState::ImportPending => "Import Pending",
            JobState::ImportIncomplete => "Import Incomplete",
            JobState::ImportError => "Import Error",
            JobState::ImportComplete => "Import Complete",
        }
    }

    /// Waiting on the external worker
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::ValidatePending | JobState::ImportPending)
    }

    /// States only the external worker may assign
    pub fn is_worker_outcome(&self) -> bool {
        matches!(
            self,
            JobState::ValidateSuccess
                | JobState::ValidateFailed
                | JobState::ImportIncomplete
                | JobState::ImportComplete
        )
    }

    /// State after attempting to hand a request of `mode` to the broker
    ///
    /// Independent of the prior state: the guard has already decided the
    /// action is allowed.
    pub fn after_submission(mode: RequestMode, delivered: bool) -> JobState {
        match (mode, delivered) {
            (RequestMode::ValidateOnly, true) => JobState::ValidatePending,
            (RequestMode::ValidateOnly, false) => JobState::ValidateError,
            (RequestMode::Import | RequestMode::Resume, true) => JobState::ImportPending,
            (RequestMode::Import | RequestMode::Resume, false) => JobState::ImportError,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown job state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for JobState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// Why an import cannot proceed from the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    AlreadyPerformed,
    InvalidFile,
    CannotStartOrResume,
    /// Worker outcome that doesn't answer the job's pending request
    UnexpectedReport,
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::AlreadyPerformed => "Import has already been performed",
            Rejection::InvalidFile => "Cannot import an invalid file",
            Rejection::CannotStartOrResume => "Cannot start or resume this import",
            Rejection::UnexpectedReport => "No pending request matches this report",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Action chosen for an import request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Start,
    Resume,
    Reject(Rejection),
}

impl Dispatch {
    /// Outbound request mode for permitted actions
    pub fn request_mode(&self) -> Option<RequestMode> {
        match self {
            Dispatch::Start => Some(RequestMode::Import),
            Dispatch::Resume => Some(RequestMode::Resume),
            Dispatch::Reject(_) => None,
        }
    }
}

/// Decide what an import request does from `state`
///
/// Error states are not retried here; they fall into the generic rejection.
pub fn guard(state: JobState) -> Dispatch {
    match state {
        JobState::ImportComplete => Dispatch::Reject(Rejection::AlreadyPerformed),
        JobState::ValidateFailed => Dispatch::Reject(Rejection::InvalidFile),
        JobState::ValidateSuccess => Dispatch::Start,
        JobState::ImportIncomplete => Dispatch::Resume,
        JobState::ValidatePending
        | JobState::ValidateError
        | JobState::ImportPending
        | JobState::ImportError => Dispatch::Reject(Rejection::CannotStartOrResume),
    }
}

/// Whether the job's form fields may still be edited
pub fn ensure_editable(state: JobState) -> Result<(), Rejection> {
    match state {
        JobState::ImportComplete => Err(Rejection::AlreadyPerformed),
        _ => Ok(()),
    }
}

/// Whether the worker may report `reported` for a job in `current`
///
/// Validation outcomes answer `validate_pending`, import outcomes answer
/// `import_pending`. A completed import takes no further reports.
pub fn accept_report(current: JobState, reported: JobState) -> Result<(), Rejection> {
    use JobState::*;
    match (current, reported) {
        (ImportComplete, _) => Err(Rejection::AlreadyPerformed),
        (ValidatePending, ValidateSuccess | ValidateFailed) => Ok(()),
        (ImportPending, ImportIncomplete | ImportComplete) => Ok(()),
        _ => Err(Rejection::UnexpectedReport),
    }
}

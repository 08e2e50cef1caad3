//! Import job operations
//!
//! Every state-affecting operation follows the same shape: check the caller,
//! check the state, encode and submit a request, then save the job exactly
//! once with whatever state the submission produced.

use chrono::{SecondsFormat, Utc};
use ingest_common::events::{EventBus, JobProgress};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ImportConfig;
use crate::db::jobs::{self, JobPage, ListScope};
use crate::error::{FieldError, JobError, JobResult};
use crate::messaging::{MessageSubmitter, MessagingError};
use crate::models::{ImportJob, JobForm};
use crate::notifier::JobStatusNotifier;
use crate::request::{job_url, JobRequest, RequestMode};
use crate::state_machine::{accept_report, ensure_editable, guard, Dispatch, JobState};

/// Identity of whoever is invoking an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user: String,
    pub admin: bool,
}

impl Caller {
    pub fn new(user: impl Into<String>, admin: bool) -> Self {
        Self {
            user: user.into(),
            admin,
        }
    }

    pub fn can_access(&self, job: &ImportJob) -> bool {
        self.admin || job.owner == self.user
    }

    pub fn list_scope(&self) -> ListScope {
        if self.admin {
            ListScope::All
        } else {
            ListScope::OwnedBy(self.user.clone())
        }
    }
}

/// Result of a state-affecting operation
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job: ImportJob,
    pub status_text: String,
    /// Set when the request could not be delivered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl JobOutcome {
    pub fn delivered(&self) -> bool {
        self.warning.is_none()
    }
}

/// A job with its display fields
#[derive(Debug, Clone, Serialize)]
pub struct JobDetails {
    pub job: ImportJob,
    pub status_text: String,
    pub job_url: String,
}

/// Defaults for a new job form
#[derive(Debug, Clone, Serialize)]
pub struct NewJobForm {
    pub name: String,
    /// Zip archives available in the binaries directory
    pub binaries_files: Vec<String>,
}

#[derive(Clone)]
pub struct JobService {
    db: SqlitePool,
    submitter: MessageSubmitter,
    notifier: JobStatusNotifier,
    config: ImportConfig,
}

impl JobService {
    pub fn new(
        db: SqlitePool,
        submitter: MessageSubmitter,
        event_bus: EventBus,
        config: ImportConfig,
    ) -> Self {
        let notifier = JobStatusNotifier::new(db.clone(), event_bus);
        Self {
            db,
            submitter,
            notifier,
            config,
        }
    }

    /// Jobs visible to `caller`, newest first
    pub async fn list(&self, caller: &Caller, page: u32) -> JobResult<JobPage> {
        Ok(jobs::list_jobs(&self.db, &caller.list_scope(), page, self.config.page_size).await?)
    }

    pub async fn show(&self, caller: &Caller, id: Uuid) -> JobResult<JobDetails> {
        let job = self.load_for(caller, id).await?;
        Ok(JobDetails {
            status_text: job.status_text(),
            job_url: job_url(&self.config.job_url_base, &job),
            job,
        })
    }

    pub fn new_form(&self, caller: &Caller) -> NewJobForm {
        NewJobForm {
            name: format!(
                "{}-{}",
                caller.user,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            binaries_files: list_binaries_files(&self.config.binaries_dir),
        }
    }

    /// Job to pre-fill an edit form; completed jobs cannot be edited
    pub async fn edit_form(&self, caller: &Caller, id: Uuid) -> JobResult<ImportJob> {
        let job = self.load_for(caller, id).await?;
        ensure_editable(job.state)?;
        Ok(job)
    }

    /// Create a job and request validation
    pub async fn create(&self, caller: &Caller, form: &JobForm) -> JobResult<JobOutcome> {
        let job = ImportJob::create(&caller.user, form, &self.config.binaries_base_location)
            .map_err(JobError::Validation)?;
        jobs::save_job(&self.db, &job).await?;

        info!(job_id = %job.id, owner = %job.owner, name = %job.name, "Import job created");

        self.submit_and_save(job, RequestMode::ValidateOnly).await
    }

    /// Apply edits and request validation again
    ///
    /// Invalid forms are rejected before anything is saved.
    pub async fn update(&self, caller: &Caller, id: Uuid, form: &JobForm) -> JobResult<JobOutcome> {
        let mut job = self.load_for(caller, id).await?;
        ensure_editable(job.state)?;
        job.apply_form(form, &self.config.binaries_base_location)
            .map_err(JobError::Validation)?;

        info!(job_id = %job.id, "Import job updated");

        self.submit_and_save(job, RequestMode::ValidateOnly).await
    }

    /// Start or resume the import, depending on the job's state
    pub async fn import(&self, caller: &Caller, id: Uuid) -> JobResult<JobOutcome> {
        let job = self.load_for(caller, id).await?;

        let mode = match guard(job.state) {
            Dispatch::Start => RequestMode::Import,
            Dispatch::Resume => RequestMode::Resume,
            Dispatch::Reject(rejection) => {
                info!(job_id = %job.id, state = %job.state, reason = %rejection, "Import rejected");
                return Err(JobError::InvalidState(rejection));
            }
        };

        self.submit_and_save(job, mode).await
    }

    /// Record an outcome reported by the external worker
    ///
    /// The outcome must answer the job's pending request. Progress is
    /// replaced only when the report carries some.
    pub async fn record_worker_report(
        &self,
        id: Uuid,
        state: JobState,
        progress: Option<JobProgress>,
    ) -> JobResult<ImportJob> {
        if !state.is_worker_outcome() {
            return Err(JobError::Validation(vec![FieldError::new(
                "state",
                "is not a worker-reported outcome",
            )]));
        }

        let mut job = jobs::find_job(&self.db, id).await?;
        if let Err(rejection) = accept_report(job.state, state) {
            warn!(job_id = %job.id, current = %job.state, reported = %state, "Worker report rejected");
            return Err(JobError::InvalidState(rejection));
        }

        let previous = job.state;
        job.state = state;
        if progress.is_some() {
            job.progress = progress;
        }
        jobs::save_job(&self.db, &job).await?;

        info!(job_id = %job.id, from = %previous, to = %job.state, "Worker report recorded");
        Ok(job)
    }

    /// Push the job's current status to observers
    pub async fn request_status_update(&self, id: Uuid) -> JobResult<JoinHandle<()>> {
        self.notifier.request_status_update(id).await
    }

    async fn load_for(&self, caller: &Caller, id: Uuid) -> JobResult<ImportJob> {
        let job = jobs::find_job(&self.db, id).await?;
        if !caller.can_access(&job) {
            warn!(job_id = %id, user = %caller.user, "Caller does not own import job");
            return Err(JobError::Forbidden(format!(
                "{} may not access import job {}",
                caller.user, id
            )));
        }
        Ok(job)
    }

    async fn submit_and_save(&self, mut job: ImportJob, mode: RequestMode) -> JobResult<JobOutcome> {
        let url = job_url(&self.config.job_url_base, &job);
        let request = JobRequest::encode(&url, &job, mode);

        let delivered = match self.submitter.submit(&request).await {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id = %job.id, mode = ?mode, error = %e, "Job request not delivered");
                false
            }
        };

        let previous = job.state;
        job.state = JobState::after_submission(mode, delivered);
        jobs::save_job(&self.db, &job).await?;

        info!(
            job_id = %job.id,
            mode = ?mode,
            from = %previous,
            to = %job.state,
            "Import job state changed"
        );

        Ok(JobOutcome {
            status_text: job.status_text(),
            warning: (!delivered).then(|| MessagingError::USER_MESSAGE.to_string()),
            job,
        })
    }
}

/// `*.zip` files in `dir`, sorted; empty if the directory can't be read
pub fn list_binaries_files(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read binaries directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".zip"))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_scope() {
        assert_eq!(Caller::new("admin", true).list_scope(), ListScope::All);
        assert_eq!(
            Caller::new("jdoe", false).list_scope(),
            ListScope::OwnedBy("jdoe".to_string())
        );
    }

    #[test]
    fn test_list_binaries_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.zip", "a.zip", "notes.txt", "c.ZIP"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("dir.zip")).unwrap();

        assert_eq!(list_binaries_files(dir.path()), vec!["a.zip", "b.zip"]);
    }

    #[test]
    fn test_missing_binaries_dir_is_empty() {
        assert!(list_binaries_files(Path::new("/nonexistent/binaries")).is_empty());
    }
}

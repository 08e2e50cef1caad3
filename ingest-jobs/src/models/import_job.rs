//! Import job record and the form used to create or edit it

use chrono::{DateTime, SubsecRound, Utc};
use ingest_common::events::JobProgress;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldError;
use crate::state_machine::JobState;

/// One attempt to import a metadata file (and optional binaries) into a
/// repository collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    /// Unique job identifier
    pub id: Uuid,

    /// Display label
    pub name: String,

    /// User who created the job
    pub owner: String,

    /// Current workflow state
    pub state: JobState,

    /// Target collection URI
    pub collection: String,

    /// Access level applied to imported items
    pub access: Option<String>,

    /// Content model of imported items
    pub model: String,

    /// Reference to the uploaded metadata file
    pub metadata_file: Option<String>,

    /// Location of the binaries archive, if any
    pub binaries_location: Option<String>,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// Worker-reported progress
    pub progress: Option<JobProgress>,
}

/// User-entered job fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobForm {
    pub name: Option<String>,
    pub collection: Option<String>,
    pub access: Option<String>,
    pub model: Option<String>,
    pub metadata_file: Option<String>,
    /// Zip file chosen from the binaries directory
    pub binaries_zip_filename: Option<String>,
}

impl ImportJob {
    /// Build a new job in `validate_pending` from a validated form
    pub fn create(
        owner: &str,
        form: &JobForm,
        binaries_base_location: &str,
    ) -> Result<Self, Vec<FieldError>> {
        let errors = form.validate(true);
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            name: trimmed(&form.name).unwrap_or_default(),
            owner: owner.to_string(),
            state: JobState::ValidatePending,
            collection: trimmed(&form.collection).unwrap_or_default(),
            access: trimmed(&form.access),
            model: trimmed(&form.model).unwrap_or_default(),
            metadata_file: trimmed(&form.metadata_file),
            binaries_location: form
                .binaries_zip_filename
                .as_deref()
                .and_then(|f| binaries_location(binaries_base_location, f)),
            // Stored with microsecond precision
            timestamp: Utc::now().trunc_subsecs(6),
            progress: None,
        })
    }

    /// Apply edited fields
    ///
    /// Blank fields leave the current value alone, except `access` which is
    /// cleared. A new metadata file must accompany every update.
    pub fn apply_form(
        &mut self,
        form: &JobForm,
        binaries_base_location: &str,
    ) -> Result<(), Vec<FieldError>> {
        let errors = form.validate(false);
        if !errors.is_empty() {
            return Err(errors);
        }

        if let Some(name) = trimmed(&form.name) {
            self.name = name;
        }
        if let Some(collection) = trimmed(&form.collection) {
            self.collection = collection;
        }
        if let Some(model) = trimmed(&form.model) {
            self.model = model;
        }
        self.access = trimmed(&form.access);
        self.metadata_file = trimmed(&form.metadata_file);
        // A blank choice keeps the current archive
        if let Some(location) = form
            .binaries_zip_filename
            .as_deref()
            .and_then(|f| binaries_location(binaries_base_location, f))
        {
            self.binaries_location = Some(location);
        }
        Ok(())
    }

    /// Worker has reported progress and the job is still waiting on it
    pub fn in_progress(&self) -> bool {
        self.state.is_pending() && self.progress.is_some()
    }

    /// Progress suffix, e.g. ` (4 of 10, 1 failed)`
    pub fn progress_text(&self) -> String {
        match &self.progress {
            Some(progress) => {
                let total = progress
                    .total
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "?".to_string());
                if progress.failed > 0 {
                    format!(" ({} of {}, {} failed)", progress.completed, total, progress.failed)
                } else {
                    format!(" ({} of {})", progress.completed, total)
                }
            }
            None => String::new(),
        }
    }

    /// Status line shown to users
    pub fn status_text(&self) -> String {
        if self.in_progress() {
            format!("In Progress{}", self.progress_text())
        } else {
            self.state.label().to_string()
        }
    }
}

impl JobForm {
    /// Field-level validation
    ///
    /// On create every required field must be present; on update only the
    /// metadata file is required, since blank fields keep their old values.
    pub fn validate(&self, creating: bool) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if creating {
            if trimmed(&self.name).is_none() {
                errors.push(FieldError::required("name"));
            }
            if trimmed(&self.collection).is_none() {
                errors.push(FieldError::required("collection"));
            }
            if trimmed(&self.model).is_none() {
                errors.push(FieldError::required("model"));
            }
        }
        if trimmed(&self.metadata_file).is_none() {
            errors.push(FieldError::required("metadata_file"));
        }
        if let Some(filename) = trimmed(&self.binaries_zip_filename) {
            if filename.contains('/') || filename.contains('\\') || filename == ".." {
                errors.push(FieldError::new(
                    "binaries_zip_filename",
                    "must be a file name, not a path",
                ));
            }
        }
        errors
    }
}

/// Join the binaries base location and a zip file name
///
/// Returns `None` for a blank file name.
pub fn binaries_location(base: &str, filename: &str) -> Option<String> {
    let filename = filename.trim();
    if filename.is_empty() {
        return None;
    }
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        Some(filename.to_string())
    } else {
        Some(format!("{}/{}", base, filename))
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_form() -> JobForm {
        JobForm {
            name: Some("batch-1".to_string()),
            collection: Some("http://repo.example/collections/maps".to_string()),
            access: Some("Public".to_string()),
            model: Some("Item".to_string()),
            metadata_file: Some("uploads/batch-1.csv".to_string()),
            binaries_zip_filename: Some("batch-1.zip".to_string()),
        }
    }

    #[test]
    fn test_create_sets_initial_state_and_owner() {
        let job = ImportJob::create("jdoe", &full_form(), "sftp://files.example/imports/").unwrap();
        assert_eq!(job.state, JobState::ValidatePending);
        assert_eq!(job.owner, "jdoe");
        assert_eq!(
            job.binaries_location.as_deref(),
            Some("sftp://files.example/imports/batch-1.zip")
        );
        assert!(job.progress.is_none());
    }

    #[test]
    fn test_create_requires_fields() {
        let form = JobForm {
            name: Some("   ".to_string()),
            ..Default::default()
        };
        let errors = ImportJob::create("jdoe", &form, "").unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "collection", "model", "metadata_file"]);
    }

    #[test]
    fn test_update_requires_metadata_file() {
        let mut job = ImportJob::create("jdoe", &full_form(), "").unwrap();
        let before = job.clone();
        let form = JobForm {
            name: Some("renamed".to_string()),
            ..Default::default()
        };

        let errors = job.apply_form(&form, "").unwrap_err();
        assert_eq!(errors, vec![FieldError::required("metadata_file")]);
        assert_eq!(job, before, "failed update must not touch the job");
    }

    #[test]
    fn test_update_keeps_identity_fields() {
        let mut job = ImportJob::create("jdoe", &full_form(), "").unwrap();
        let (id, owner, timestamp) = (job.id, job.owner.clone(), job.timestamp);
        let form = JobForm {
            name: Some("renamed".to_string()),
            metadata_file: Some("uploads/batch-1-fixed.csv".to_string()),
            ..Default::default()
        };

        job.apply_form(&form, "").unwrap();
        assert_eq!(job.name, "renamed");
        assert_eq!(job.metadata_file.as_deref(), Some("uploads/batch-1-fixed.csv"));
        assert_eq!(job.access, None);
        assert_eq!(job.model, "Item");
        assert_eq!((job.id, job.owner.as_str(), job.timestamp), (id, "jdoe", timestamp));
    }

    #[test]
    fn test_blank_zip_choice_keeps_archive() {
        let mut job = ImportJob::create("jdoe", &full_form(), "/data/zips").unwrap();
        let form = JobForm {
            metadata_file: Some("uploads/batch-1-fixed.csv".to_string()),
            binaries_zip_filename: Some("  ".to_string()),
            ..Default::default()
        };

        job.apply_form(&form, "/data/zips").unwrap();
        assert_eq!(job.binaries_location.as_deref(), Some("/data/zips/batch-1.zip"));

        let form = JobForm {
            binaries_zip_filename: Some("batch-2.zip".to_string()),
            ..form
        };
        job.apply_form(&form, "/data/zips").unwrap();
        assert_eq!(job.binaries_location.as_deref(), Some("/data/zips/batch-2.zip"));
    }

    #[test]
    fn test_zip_filename_must_not_be_a_path() {
        let form = JobForm {
            binaries_zip_filename: Some("../etc/passwd".to_string()),
            ..full_form()
        };
        let errors = form.validate(true);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "binaries_zip_filename");
    }

    #[test]
    fn test_binaries_location_join() {
        assert_eq!(binaries_location("/data/zips", "a.zip").as_deref(), Some("/data/zips/a.zip"));
        assert_eq!(binaries_location("/data/zips/", "a.zip").as_deref(), Some("/data/zips/a.zip"));
        assert_eq!(binaries_location("", "a.zip").as_deref(), Some("a.zip"));
        assert_eq!(binaries_location("/data", "  "), None);
    }

    #[test]
    fn test_status_text() {
        let mut job = ImportJob::create("jdoe", &full_form(), "").unwrap();
        assert_eq!(job.status_text(), "Validation Pending");

        job.state = JobState::ImportPending;
        job.progress = Some(JobProgress {
            total: Some(10),
            completed: 4,
            failed: 0,
        });
        assert_eq!(job.status_text(), "In Progress (4 of 10)");

        job.progress = Some(JobProgress {
            total: None,
            completed: 4,
            failed: 2,
        });
        assert_eq!(job.status_text(), "In Progress (4 of ?, 2 failed)");

        job.state = JobState::ImportIncomplete;
        assert_eq!(job.status_text(), "Import Incomplete");
    }
}

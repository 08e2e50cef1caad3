//! Outbound import job requests
//!
//! The worker reads its arguments from message headers; the body carries the
//! metadata file reference it should fetch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::ImportJob;

pub const HEADER_JOB_ID: &str = "ImportJobId";
pub const HEADER_COMMAND: &str = "ImportCommand";
pub const HEADER_MODEL: &str = "ImportArg-model";
pub const HEADER_MEMBER_OF: &str = "ImportArg-member-of";
pub const HEADER_ACCESS: &str = "ImportArg-access";
pub const HEADER_BINARIES_LOCATION: &str = "ImportArg-binaries-location";
pub const HEADER_VALIDATE_ONLY: &str = "ImportArg-validate-only";
pub const HEADER_RESUME: &str = "ImportArg-resume";

/// What the worker is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Check the import without committing changes
    ValidateOnly,
    /// Fresh import
    Import,
    /// Continue a partially completed import
    Resume,
}

/// Encoded message ready for the submitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl JobRequest {
    /// Encode `job` for `mode`
    ///
    /// `job_url` is the job's addressable identifier, echoed back by the
    /// worker in its reports.
    pub fn encode(job_url: &str, job: &ImportJob, mode: RequestMode) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_JOB_ID.to_string(), job_url.to_string());
        headers.insert(HEADER_COMMAND.to_string(), "import".to_string());
        headers.insert(HEADER_MODEL.to_string(), job.model.clone());
        headers.insert(HEADER_MEMBER_OF.to_string(), job.collection.clone());
        headers.insert("persistent".to_string(), "true".to_string());

        if let Some(access) = &job.access {
            headers.insert(HEADER_ACCESS.to_string(), access.clone());
        }
        if let Some(location) = &job.binaries_location {
            headers.insert(HEADER_BINARIES_LOCATION.to_string(), location.clone());
        }

        match mode {
            RequestMode::ValidateOnly => {
                headers.insert(HEADER_VALIDATE_ONLY.to_string(), "true".to_string());
            }
            RequestMode::Resume => {
                headers.insert(HEADER_RESUME.to_string(), "true".to_string());
            }
            RequestMode::Import => {}
        }

        Self {
            body: job.metadata_file.clone().unwrap_or_default(),
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Addressable identifier for a job
pub fn job_url(base: &str, job: &ImportJob) -> String {
    format!("{}/import_jobs/{}", base.trim_end_matches('/'), job.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobForm;

    fn job(access: Option<&str>, zip: Option<&str>) -> ImportJob {
        let form = JobForm {
            name: Some("batch".to_string()),
            collection: Some("http://repo.example/pcdm/maps".to_string()),
            access: access.map(str::to_string),
            model: Some("Item".to_string()),
            metadata_file: Some("uploads/batch.csv".to_string()),
            binaries_zip_filename: zip.map(str::to_string),
        };
        ImportJob::create("jdoe", &form, "/srv/binaries").unwrap()
    }

    #[test]
    fn test_validate_only_headers() {
        let job = job(Some("Campus"), Some("batch.zip"));
        let url = job_url("https://ingest.example/", &job);
        let request = JobRequest::encode(&url, &job, RequestMode::ValidateOnly);

        assert_eq!(request.body, "uploads/batch.csv");
        assert_eq!(request.header(HEADER_JOB_ID), Some(url.as_str()));
        assert_eq!(request.header(HEADER_VALIDATE_ONLY), Some("true"));
        assert_eq!(request.header(HEADER_RESUME), None);
        assert_eq!(request.header(HEADER_ACCESS), Some("Campus"));
        assert_eq!(
            request.header(HEADER_BINARIES_LOCATION),
            Some("/srv/binaries/batch.zip")
        );
        assert_eq!(request.header(HEADER_MEMBER_OF), Some("http://repo.example/pcdm/maps"));
    }

    #[test]
    fn test_mode_flags() {
        let job = job(None, None);
        let import = JobRequest::encode("u", &job, RequestMode::Import);
        assert_eq!(import.header(HEADER_VALIDATE_ONLY), None);
        assert_eq!(import.header(HEADER_RESUME), None);
        assert_eq!(import.header(HEADER_ACCESS), None);
        assert_eq!(import.header(HEADER_BINARIES_LOCATION), None);

        let resume = JobRequest::encode("u", &job, RequestMode::Resume);
        assert_eq!(resume.header(HEADER_RESUME), Some("true"));
        assert_eq!(resume.header(HEADER_VALIDATE_ONLY), None);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let job = job(Some("Public"), Some("batch.zip"));
        for mode in [RequestMode::ValidateOnly, RequestMode::Import, RequestMode::Resume] {
            assert_eq!(
                JobRequest::encode("u", &job, mode),
                JobRequest::encode("u", &job, mode)
            );
        }
    }

    #[test]
    fn test_job_url() {
        let job = job(None, None);
        assert_eq!(
            job_url("http://localhost:3000/", &job),
            format!("http://localhost:3000/import_jobs/{}", job.id)
        );
    }
}

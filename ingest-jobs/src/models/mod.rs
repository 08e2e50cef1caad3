//! Data models for ingest-jobs

pub mod import_job;

pub use import_job::{binaries_location, ImportJob, JobForm};

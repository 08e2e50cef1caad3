//! Test Helper Utilities
//!
//! Shared setup for ingest-jobs integration tests

#![allow(dead_code)]

use std::sync::Arc;

use ingest_jobs::config::ServiceConfig;
use ingest_jobs::messaging::InMemoryTransport;
use ingest_jobs::models::{ImportJob, JobForm};
use ingest_jobs::{AppState, Caller, JobState};
use tempfile::TempDir;

/// App wired to an on-disk SQLite database and an in-memory transport
pub struct TestApp {
    pub state: AppState,
    pub transport: Arc<InMemoryTransport>,
    pub config: ServiceConfig,
    // Keeps the database directory alive
    pub dir: TempDir,
}

pub async fn create_test_app() -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let mut config = ServiceConfig::default();
    config.database_path = dir.path().join("ingest.db");
    config.import.job_url_base = "https://ingest.example".to_string();
    config.import.binaries_dir = dir.path().join("binaries");
    config.import.binaries_base_location = "sftp://files.example/binaries".to_string();

    let db = ingest_jobs::db::init_database_pool(&config.database_path)
        .await
        .expect("Failed to initialize database");

    let transport = Arc::new(InMemoryTransport::new());
    let state = AppState::new(db, transport.clone(), &config);

    TestApp {
        state,
        transport,
        config,
        dir,
    }
}

pub fn valid_form(name: &str) -> JobForm {
    JobForm {
        name: Some(name.to_string()),
        collection: Some("http://repo.example/pcdm/maps".to_string()),
        access: Some("Public".to_string()),
        model: Some("Item".to_string()),
        metadata_file: Some(format!("uploads/{}.csv", name)),
        binaries_zip_filename: Some(format!("{}.zip", name)),
    }
}

/// Create a job for `jdoe`, pass validation and start the import
///
/// Leaves the job in `import_pending`.
pub async fn create_import_pending(app: &TestApp, name: &str) -> ImportJob {
    let service = &app.state.service;
    let caller = Caller::new("jdoe", false);
    let job = service
        .create(&caller, &valid_form(name))
        .await
        .expect("Failed to create job")
        .job;
    service
        .record_worker_report(job.id, JobState::ValidateSuccess, None)
        .await
        .expect("Failed to record validation");
    let outcome = service
        .import(&caller, job.id)
        .await
        .expect("Failed to start import");
    assert_eq!(outcome.job.state, JobState::ImportPending);
    outcome.job
}

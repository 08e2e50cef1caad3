//! Status notification tests

mod helpers;

use std::time::Duration;

use helpers::{create_import_pending, create_test_app, valid_form};
use ingest_common::events::{IngestEvent, JobProgress};
use ingest_jobs::db::jobs::find_job;
use ingest_jobs::notifier::StatusRelay;
use ingest_jobs::{Caller, JobError, JobState};
use uuid::Uuid;

#[tokio::test]
async fn test_status_update_broadcasts_current_state() {
    let app = create_test_app().await;
    let service = &app.state.service;
    let job = create_import_pending(&app, "batch-1").await;
    let progress = JobProgress {
        total: Some(10),
        completed: 4,
        failed: 1,
    };
    service
        .record_worker_report(job.id, JobState::ImportIncomplete, Some(progress))
        .await
        .unwrap();
    let before = find_job(&app.state.db, job.id).await.unwrap();

    let mut rx = app.state.event_bus.subscribe();
    let handle = service.request_status_update(job.id).await.unwrap();
    handle.await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("No status event")
        .unwrap();
    match event {
        IngestEvent::ImportJobStatus {
            job_id,
            state,
            status_text,
            progress: sent_progress,
            ..
        } => {
            assert_eq!(job_id, job.id);
            assert_eq!(state, "import_incomplete");
            assert_eq!(status_text, "Import Incomplete");
            assert_eq!(sent_progress, Some(progress));
        }
    }
    assert!(rx.try_recv().is_err(), "exactly one event expected");

    let after = find_job(&app.state.db, job.id).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_repeated_status_updates_each_broadcast() {
    let app = create_test_app().await;
    let service = &app.state.service;
    let job = service
        .create(&Caller::new("jdoe", false), &valid_form("batch-1"))
        .await
        .unwrap()
        .job;
    let before = find_job(&app.state.db, job.id).await.unwrap();

    let mut rx = app.state.event_bus.subscribe();
    for _ in 0..2 {
        service
            .request_status_update(job.id)
            .await
            .unwrap()
            .await
            .unwrap();
    }

    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("No status event")
            .unwrap();
        assert_eq!(event.job_id(), job.id);
    }
    assert!(rx.try_recv().is_err(), "exactly two events expected");

    let after = find_job(&app.state.db, job.id).await.unwrap();
    assert_eq!(after, before);
    assert!(app.transport.published().iter().all(|m| m.topic == "jobs"));
}

#[tokio::test]
async fn test_status_update_for_unknown_job() {
    let app = create_test_app().await;
    let err = app
        .state
        .service
        .request_status_update(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotFound(_)));
}

#[tokio::test]
async fn test_status_update_without_subscribers_is_dropped() {
    let app = create_test_app().await;
    let service = &app.state.service;
    let job = service
        .create(&Caller::new("jdoe", false), &valid_form("batch-1"))
        .await
        .unwrap()
        .job;

    let handle = service.request_status_update(job.id).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_relay_publishes_to_status_topic() {
    let app = create_test_app().await;
    let service = &app.state.service;
    let job = service
        .create(&Caller::new("jdoe", false), &valid_form("batch-1"))
        .await
        .unwrap()
        .job;

    let relay = StatusRelay::spawn(&app.state.event_bus, app.state.transport.clone());
    service
        .request_status_update(job.id)
        .await
        .unwrap()
        .await
        .unwrap();

    // Closing the bus ends the relay once it has forwarded everything
    let transport = app.transport.clone();
    drop(app);
    tokio::time::timeout(Duration::from_secs(1), relay)
        .await
        .expect("Relay did not stop")
        .unwrap();

    let status: Vec<_> = transport
        .published()
        .into_iter()
        .filter(|m| m.topic == "status")
        .collect();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].headers.get("event").map(String::as_str), Some("ImportJobStatus"));
    assert_eq!(
        status[0].headers.get("ImportJobId"),
        Some(&job.id.to_string())
    );

    let body: serde_json::Value = serde_json::from_str(&status[0].body).unwrap();
    assert_eq!(body["type"], "ImportJobStatus");
    assert_eq!(body["state"], "validate_pending");
}

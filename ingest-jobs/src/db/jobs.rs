//! Import job persistence

use chrono::{DateTime, SecondsFormat, Utc};
use ingest_common::events::JobProgress;
use ingest_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::ImportJob;
use crate::state_machine::JobState;

/// Which jobs a listing may include
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    All,
    OwnedBy(String),
}

/// One page of jobs, newest first
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<ImportJob>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
}

impl JobPage {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.page_size as u64)
    }
}

/// Insert or update a job
///
/// `id`, `owner` and `timestamp` are only written on insert.
pub async fn save_job(pool: &SqlitePool, job: &ImportJob) -> Result<()> {
    let progress = job
        .progress
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize progress: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO import_jobs (
            id, name, owner, state, collection, access, model,
            metadata_file, binaries_location, timestamp, progress
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            state = excluded.state,
            collection = excluded.collection,
            access = excluded.access,
            model = excluded.model,
            metadata_file = excluded.metadata_file,
            binaries_location = excluded.binaries_location,
            progress = excluded.progress
        "#,
    )
    .bind(job.id.to_string())
    .bind(&job.name)
    .bind(&job.owner)
    .bind(job.state.as_str())
    .bind(&job.collection)
    .bind(&job.access)
    .bind(&job.model)
    .bind(&job.metadata_file)
    .bind(&job.binaries_location)
    .bind(format_timestamp(&job.timestamp))
    .bind(progress)
    .execute(pool)
    .await?;

    tracing::debug!(job_id = %job.id, state = %job.state, "Import job saved");
    Ok(())
}

/// Load a job, `None` if it doesn't exist
pub async fn load_job(pool: &SqlitePool, id: Uuid) -> Result<Option<ImportJob>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, owner, state, collection, access, model,
               metadata_file, binaries_location, timestamp, progress
        FROM import_jobs
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Load a job, `Error::NotFound` if it doesn't exist
pub async fn find_job(pool: &SqlitePool, id: Uuid) -> Result<ImportJob> {
    load_job(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(id.to_string()))
}

/// List jobs newest first
pub async fn list_jobs(
    pool: &SqlitePool,
    scope: &ListScope,
    page: u32,
    page_size: u32,
) -> Result<JobPage> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let offset = (page as i64 - 1) * page_size as i64;

    let (total_count, rows): (i64, Vec<SqliteRow>) = match scope {
        ListScope::All => {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs")
                .fetch_one(pool)
                .await?;
            let rows = sqlx::query(
                r#"
                SELECT id, name, owner, state, collection, access, model,
                       metadata_file, binaries_location, timestamp, progress
                FROM import_jobs
                ORDER BY timestamp DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(pool)
            .await?;
            (count, rows)
        }
        ListScope::OwnedBy(owner) => {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs WHERE owner = ?")
                .bind(owner)
                .fetch_one(pool)
                .await?;
            let rows = sqlx::query(
                r#"
                SELECT id, name, owner, state, collection, access, model,
                       metadata_file, binaries_location, timestamp, progress
                FROM import_jobs
                WHERE owner = ?
                ORDER BY timestamp DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(owner)
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(pool)
            .await?;
            (count, rows)
        }
    };

    let jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>>>()?;

    Ok(JobPage {
        jobs,
        page,
        page_size,
        total_count: total_count.max(0) as u64,
    })
}

// Fixed-width UTC so that text ordering matches time ordering
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn job_from_row(row: &SqliteRow) -> Result<ImportJob> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Failed to parse job id '{}': {}", id, e)))?;

    let state: String = row.get("state");
    let state: JobState = state
        .parse()
        .map_err(|e| Error::Internal(format!("{} for {}", e, id)))?;

    let timestamp: String = row.get("timestamp");
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp: {}", e)))?
        .with_timezone(&Utc);

    let progress: Option<String> = row.get("progress");
    let progress = progress
        .map(|p| serde_json::from_str::<JobProgress>(&p))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize progress: {}", e)))?;

    Ok(ImportJob {
        id,
        name: row.get("name"),
        owner: row.get("owner"),
        state,
        collection: row.get("collection"),
        access: row.get("access"),
        model: row.get("model"),
        metadata_file: row.get("metadata_file"),
        binaries_location: row.get("binaries_location"),
        timestamp,
        progress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobForm;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init_database_pool(&dir.path().join("jobs.db"))
            .await
            .unwrap();
        (dir, pool)
    }

    fn job(owner: &str, name: &str) -> ImportJob {
        let form = JobForm {
            name: Some(name.to_string()),
            collection: Some("http://repo.example/c/1".to_string()),
            access: None,
            model: Some("Item".to_string()),
            metadata_file: Some(format!("uploads/{}.csv", name)),
            binaries_zip_filename: None,
        };
        ImportJob::create(owner, &form, "").unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let (_dir, pool) = test_pool().await;
        let mut original = job("jdoe", "a");
        original.progress = Some(JobProgress {
            total: Some(3),
            completed: 1,
            failed: 0,
        });
        save_job(&pool, &original).await.unwrap();

        let loaded = find_job(&pool, original.id).await.unwrap();
        assert_eq!(loaded.name, original.name);
        assert_eq!(loaded.state, JobState::ValidatePending);
        assert_eq!(loaded.progress, original.progress);
        assert_eq!(
            loaded.timestamp.timestamp_micros(),
            original.timestamp.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_missing_job_is_distinguishable() {
        let (_dir, pool) = test_pool().await;
        let id = Uuid::new_v4();
        assert!(load_job(&pool, id).await.unwrap().is_none());
        assert!(matches!(find_job(&pool, id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_never_changes_owner() {
        let (_dir, pool) = test_pool().await;
        let mut j = job("jdoe", "a");
        save_job(&pool, &j).await.unwrap();

        j.owner = "mallory".to_string();
        j.state = JobState::ValidateSuccess;
        save_job(&pool, &j).await.unwrap();

        let loaded = find_job(&pool, j.id).await.unwrap();
        assert_eq!(loaded.owner, "jdoe");
        assert_eq!(loaded.state, JobState::ValidateSuccess);
    }

    #[tokio::test]
    async fn test_list_scope_and_order() {
        let (_dir, pool) = test_pool().await;
        let base = Utc::now();
        for (i, owner) in ["jdoe", "asmith", "jdoe"].iter().enumerate() {
            let mut j = job(owner, &format!("job-{}", i));
            j.timestamp = base + chrono::Duration::seconds(i as i64);
            save_job(&pool, &j).await.unwrap();
        }

        let all = list_jobs(&pool, &ListScope::All, 1, 30).await.unwrap();
        let names: Vec<_> = all.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["job-2", "job-1", "job-0"]);

        let mine = list_jobs(&pool, &ListScope::OwnedBy("jdoe".to_string()), 1, 30)
            .await
            .unwrap();
        assert_eq!(mine.total_count, 2);
        assert!(mine.jobs.iter().all(|j| j.owner == "jdoe"));
    }

    #[tokio::test]
    async fn test_pagination() {
        let (_dir, pool) = test_pool().await;
        let base = Utc::now();
        for i in 0..5 {
            let mut j = job("jdoe", &format!("job-{}", i));
            j.timestamp = base + chrono::Duration::seconds(i);
            save_job(&pool, &j).await.unwrap();
        }

        let page = list_jobs(&pool, &ListScope::All, 2, 2).await.unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages(), 3);
        let names: Vec<_> = page.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["job-2", "job-1"]);

        // Page 0 is treated as the first page
        let first = list_jobs(&pool, &ListScope::All, 0, 2).await.unwrap();
        assert_eq!(first.page, 1);
        assert_eq!(first.jobs[0].name, "job-4");
    }
}

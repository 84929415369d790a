//! Job read operations: list and get.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::QueueDb;
use super::super::types::{CustomClip, Job, JobId, JobProgress, JobStatus};
use crate::retry::ErrorClass;

const JOB_COLUMNS: &str = r#"
    id, url, title, date, streamer, duration_label, status,
    progress_percent, speed, eta, current_part, total_parts,
    downloaded_bytes, total_bytes, last_error, custom_clip_json,
    attempt, retry_at_ms, error_class, retry_exhausted, output_path
"#;

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: i64 = row.get("id");
    let status_str: String = row.get("status");
    let clip_json: Option<String> = row.get("custom_clip_json");
    let custom_clip = clip_json
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(serde_json::from_str::<CustomClip>)
        .transpose()
        .with_context(|| format!("decode custom clip of job {}", id))?;
    let error_class: Option<String> = row.get("error_class");
    let current_part: i64 = row.get("current_part");
    let total_parts: i64 = row.get("total_parts");
    let downloaded_bytes: i64 = row.get("downloaded_bytes");
    let total_bytes: i64 = row.get("total_bytes");
    let attempt: i64 = row.get("attempt");
    let last_error: Option<String> = row.get("last_error");

    // A status this build does not know is surfaced as a failed job with a reason.
    let (status, last_error) = match status_str.parse::<JobStatus>() {
        Ok(status) => (status, last_error),
        Err(e) => {
            tracing::warn!(job_id = id, "{}", e);
            let reason = last_error
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("{} in queue database", e));
            (JobStatus::Error, Some(reason))
        }
    };

    Ok(Job {
        id,
        url: row.get("url"),
        title: row.get("title"),
        date: row.get("date"),
        streamer: row.get("streamer"),
        duration_label: row.get("duration_label"),
        status,
        progress: JobProgress {
            progress_percent: row.get("progress_percent"),
            speed: row.get("speed"),
            eta: row.get("eta"),
            current_part: current_part.max(0) as u32,
            total_parts: total_parts.max(0) as u32,
            downloaded_bytes: downloaded_bytes.max(0) as u64,
            total_bytes: total_bytes.max(0) as u64,
        },
        last_error,
        custom_clip,
        attempt: attempt.max(1) as u32,
        retry_at_ms: row.get("retry_at_ms"),
        error_class: error_class.as_deref().and_then(|s| s.parse::<ErrorClass>().ok()),
        retry_exhausted: row.get("retry_exhausted"),
        output_path: row.get("output_path"),
    })
}

impl QueueDb {
    /// List all jobs in queue order.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let sql = format!("SELECT {} FROM jobs ORDER BY position ASC, id ASC", JOB_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Fetch a single job row.
    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }
}

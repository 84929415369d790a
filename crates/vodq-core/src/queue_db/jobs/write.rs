//! Job write operations: insert, update, reorder, remove.
//!
//! Every operation commits before returning so a crash right after a
//! successful call cannot lose the mutation.

use anyhow::Result;

use super::super::db::{unix_timestamp, QueueDb};
use super::super::types::{Candidate, Job, JobId, JobProgress, JobStatus};

impl QueueDb {
    /// Append a new pending job at the end of the queue and return it.
    pub async fn insert_job(&self, candidate: &Candidate) -> Result<Job> {
        let now = unix_timestamp();
        let clip_json = candidate
            .custom_clip
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;
        let position: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(position), -1) + 1 FROM jobs")
            .fetch_one(&mut *tx)
            .await?;
        let id = sqlx::query(
            r#"
            INSERT INTO jobs (
                position, url, title, date, streamer, duration_label,
                status, custom_clip_json, attempt, retry_exhausted,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, 0, ?9, ?10)
            "#,
        )
        .bind(position)
        .bind(&candidate.url)
        .bind(&candidate.title)
        .bind(&candidate.date)
        .bind(&candidate.streamer)
        .bind(&candidate.duration_label)
        .bind(JobStatus::Pending.as_str())
        .bind(clip_json)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        Ok(Job {
            id,
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            date: candidate.date.clone(),
            streamer: candidate.streamer.clone(),
            duration_label: candidate.duration_label.clone(),
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            last_error: None,
            custom_clip: candidate.custom_clip.clone(),
            attempt: 1,
            retry_at_ms: None,
            error_class: None,
            retry_exhausted: false,
            output_path: None,
        })
    }

    /// Write every mutable field of `job` (status, progress, retry state, output).
    pub async fn update_job(&self, job: &Job) -> Result<()> {
        let now = unix_timestamp();
        let p = &job.progress;
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?1,
                progress_percent = ?2,
                speed = ?3,
                eta = ?4,
                current_part = ?5,
                total_parts = ?6,
                downloaded_bytes = ?7,
                total_bytes = ?8,
                last_error = ?9,
                attempt = ?10,
                retry_at_ms = ?11,
                error_class = ?12,
                retry_exhausted = ?13,
                output_path = ?14,
                updated_at = ?15
            WHERE id = ?16
            "#,
        )
        .bind(job.status.as_str())
        .bind(p.progress_percent)
        .bind(&p.speed)
        .bind(&p.eta)
        .bind(i64::from(p.current_part))
        .bind(i64::from(p.total_parts))
        .bind(p.downloaded_bytes as i64)
        .bind(p.total_bytes as i64)
        .bind(&job.last_error)
        .bind(i64::from(job.attempt))
        .bind(job.retry_at_ms)
        .bind(job.error_class.map(|c| c.as_str()))
        .bind(job.retry_exhausted)
        .bind(&job.output_path)
        .bind(now)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update only the progress columns (and updated_at).
    pub async fn update_progress(&self, id: JobId, p: &JobProgress) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET progress_percent = ?1,
                speed = ?2,
                eta = ?3,
                current_part = ?4,
                total_parts = ?5,
                downloaded_bytes = ?6,
                total_bytes = ?7,
                updated_at = ?8
            WHERE id = ?9
            "#,
        )
        .bind(p.progress_percent)
        .bind(&p.speed)
        .bind(&p.eta)
        .bind(i64::from(p.current_part))
        .bind(i64::from(p.total_parts))
        .bind(p.downloaded_bytes as i64)
        .bind(p.total_bytes as i64)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrite positions so the queue follows `ordered_ids` exactly.
    /// The caller guarantees `ordered_ids` is a permutation of the stored ids.
    pub async fn reorder(&self, ordered_ids: &[JobId]) -> Result<()> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        for (position, id) in ordered_ids.iter().enumerate() {
            sqlx::query("UPDATE jobs SET position = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(position as i64)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Normalize any job left in `downloading` to `paused` (e.g. after a crash),
    /// so the next start resumes it. Returns the number of jobs reset.
    pub async fn recover_downloading_jobs(&self) -> Result<u64> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'paused',
                updated_at = ?1
            WHERE status = 'downloading'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Permanently remove a job row from the database.
    ///
    /// File cleanup is handled separately by higher layers.
    pub async fn remove_job(&self, id: JobId) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every completed job. Returns the number of rows deleted.
    pub async fn remove_completed(&self) -> Result<u64> {
        let r = sqlx::query("DELETE FROM jobs WHERE status = 'completed'")
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}

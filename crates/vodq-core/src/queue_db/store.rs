//! Ordered in-memory view of the queue, written through to [`QueueDb`].
//!
//! The database write happens first; the in-memory copy is only touched once
//! the write has committed, so a failed write leaves both sides unchanged.

use std::collections::HashSet;

use crate::config::DuplicateKey;
use crate::error::{QueueError, QueueResult};

use super::db::QueueDb;
use super::types::{Candidate, Job, JobId, JobProgress, JobStatus};

/// Result of [`QueueStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(JobId),
    /// A non-error job already matches; the queue is unchanged.
    Duplicate(JobId),
}

pub struct QueueStore {
    db: QueueDb,
    jobs: Vec<Job>,
}

impl QueueStore {
    /// Load the queue, resetting jobs stranded in `downloading` by a previous run.
    pub async fn load(db: QueueDb) -> QueueResult<Self> {
        let recovered = db.recover_downloading_jobs().await?;
        if recovered > 0 {
            tracing::info!("recovered {} interrupted job(s) as paused", recovered);
        }
        let jobs = db.list_jobs().await?;
        Ok(Self { db, jobs })
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn list(&self) -> Vec<Job> {
        self.jobs.clone()
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// First non-error job matching `candidate` under `key`.
    pub fn find_duplicate(&self, candidate: &Candidate, key: DuplicateKey) -> Option<&Job> {
        self.jobs
            .iter()
            .filter(|j| j.status != JobStatus::Error)
            .find(|j| j.matches(candidate, key))
    }

    /// Append `candidate` as a pending job. With `dedup` set, a matching
    /// non-error job turns the call into a no-op.
    pub async fn add(
        &mut self,
        candidate: &Candidate,
        dedup: Option<DuplicateKey>,
    ) -> QueueResult<AddOutcome> {
        candidate.validate()?;
        if let Some(key) = dedup {
            if let Some(existing) = self.find_duplicate(candidate, key) {
                tracing::debug!(job_id = existing.id, "duplicate candidate ignored");
                return Ok(AddOutcome::Duplicate(existing.id));
            }
        }
        let job = self.db.insert_job(candidate).await?;
        let id = job.id;
        self.jobs.push(job);
        tracing::info!(job_id = id, url = %candidate.url, "job queued");
        Ok(AddOutcome::Added(id))
    }

    /// Delete a job. `active` is the id currently owned by the runner, which
    /// must be cancelled before it can be removed.
    pub async fn remove(&mut self, id: JobId, active: Option<JobId>) -> QueueResult<()> {
        let job = self.get(id).ok_or(QueueError::NotFound(id))?;
        if active == Some(id) || job.status == JobStatus::Downloading {
            return Err(QueueError::InvalidState(format!(
                "job {} is downloading; cancel it before removing",
                id
            )));
        }
        self.db.remove_job(id).await?;
        self.jobs.retain(|j| j.id != id);
        tracing::info!(job_id = id, "job removed");
        Ok(())
    }

    /// Apply a user-supplied order, which must be a permutation of current ids.
    pub async fn reorder(&mut self, ordered_ids: &[JobId]) -> QueueResult<()> {
        let current: HashSet<JobId> = self.jobs.iter().map(|j| j.id).collect();
        let requested: HashSet<JobId> = ordered_ids.iter().copied().collect();
        if ordered_ids.len() != self.jobs.len()
            || requested.len() != ordered_ids.len()
            || requested != current
        {
            return Err(QueueError::InvalidArgument(
                "reorder ids must be a permutation of the queued job ids".into(),
            ));
        }
        self.db.reorder(ordered_ids).await?;
        let mut reordered = Vec::with_capacity(self.jobs.len());
        for id in ordered_ids {
            if let Some(pos) = self.jobs.iter().position(|j| j.id == *id) {
                reordered.push(self.jobs.swap_remove(pos));
            }
        }
        self.jobs = reordered;
        Ok(())
    }

    /// Remove every completed job; returns how many were removed.
    pub async fn clear_completed(&mut self) -> QueueResult<usize> {
        self.db.remove_completed().await?;
        let before = self.jobs.len();
        self.jobs.retain(|j| j.status != JobStatus::Completed);
        Ok(before - self.jobs.len())
    }

    /// Mutate one job through `f` and persist the full row.
    pub async fn update<F>(&mut self, id: JobId, f: F) -> QueueResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        let idx = self
            .jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;
        let mut job = self.jobs[idx].clone();
        f(&mut job);
        self.db.update_job(&job).await?;
        self.jobs[idx] = job.clone();
        Ok(job)
    }

    /// Replace a job's progress in memory; write it through only when `flush`.
    pub async fn set_progress(
        &mut self,
        id: JobId,
        progress: JobProgress,
        flush: bool,
    ) -> QueueResult<()> {
        if flush {
            self.db.update_progress(id, &progress).await?;
        }
        let job = self
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;
        job.progress = progress;
        Ok(())
    }
}

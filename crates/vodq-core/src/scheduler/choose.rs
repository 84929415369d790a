//! Next-job selection.

use crate::queue_db::{Job, JobId, JobStatus};
use crate::retry::RetryManager;

/// Pick the job to run next: paused jobs first, then pending jobs, each in
/// queue order. With `smart`, jobs that failed more than once this session go
/// behind the others. The persisted order is never touched.
pub fn choose_next(jobs: &[Job], retry: &RetryManager, smart: bool) -> Option<JobId> {
    let eligible = |status: JobStatus| {
        let mut ids: Vec<JobId> = jobs
            .iter()
            .filter(|j| j.status == status && j.retry_at_ms.is_none())
            .map(|j| j.id)
            .collect();
        if smart {
            // Stable: relative order inside each group is kept.
            ids.sort_by_key(|id| retry.session_failures(*id) > 1);
        }
        ids
    };

    let chosen = eligible(JobStatus::Paused)
        .into_iter()
        .chain(eligible(JobStatus::Pending))
        .next();
    if let Some(id) = chosen {
        tracing::debug!(job_id = id, smart, "scheduler picked next job");
    }
    chosen
}

//! Events broadcast to presentation-layer subscribers.

use serde::{Deserialize, Serialize};

use crate::queue_db::{Job, JobId, JobProgress, JobStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum QueueEvent {
    /// Full ordered queue after any mutation.
    QueueUpdated { jobs: Vec<Job> },
    DownloadProgress { job_id: JobId, progress: JobProgress },
    DownloadStarted { job_id: JobId, title: String },
    /// `status` is the job's status after the run ended.
    DownloadFinished {
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
    },
}

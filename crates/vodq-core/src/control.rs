//! Control protocol for a running orchestrator.
//!
//! `vodq run` owns the orchestrator and listens on a unix socket; other CLI
//! invocations send one JSON [`ControlRequest`] per line and read one JSON
//! [`ControlResponse`] line back.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::metrics::RuntimeMetrics;
use crate::orchestrator::Orchestrator;
use crate::queue_db::{Candidate, Job, JobId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlRequest {
    GetQueue,
    AddToQueue { candidate: Candidate },
    RemoveFromQueue { id: JobId },
    ReorderQueue { ids: Vec<JobId> },
    ClearCompleted,
    StartDownload,
    PauseDownload,
    CancelDownload,
    IsDownloading,
    RetryFailedDownloads,
    GetRuntimeMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlResponse {
    Queue { jobs: Vec<Job> },
    Flag { value: bool },
    Metrics { metrics: Box<RuntimeMetrics> },
    Error { code: String, message: String },
}

impl From<QueueError> for ControlResponse {
    fn from(e: QueueError) -> Self {
        ControlResponse::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl ControlResponse {
    /// Parse failures and other protocol-level problems.
    pub fn bad_request(message: impl Into<String>) -> Self {
        ControlResponse::Error {
            code: "bad_request".to_string(),
            message: message.into(),
        }
    }
}

fn queue(res: Result<Vec<Job>, QueueError>) -> ControlResponse {
    match res {
        Ok(jobs) => ControlResponse::Queue { jobs },
        Err(e) => e.into(),
    }
}

fn flag(res: Result<bool, QueueError>) -> ControlResponse {
    match res {
        Ok(value) => ControlResponse::Flag { value },
        Err(e) => e.into(),
    }
}

impl Orchestrator {
    /// Execute one control request.
    pub async fn handle(&self, req: ControlRequest) -> ControlResponse {
        tracing::debug!(?req, "control request");
        match req {
            ControlRequest::GetQueue => ControlResponse::Queue {
                jobs: self.get_queue().await,
            },
            ControlRequest::AddToQueue { candidate } => queue(self.add_to_queue(candidate).await),
            ControlRequest::RemoveFromQueue { id } => queue(self.remove_from_queue(id).await),
            ControlRequest::ReorderQueue { ids } => queue(self.reorder_queue(&ids).await),
            ControlRequest::ClearCompleted => queue(self.clear_completed().await),
            ControlRequest::StartDownload => flag(self.start_download().await),
            ControlRequest::PauseDownload => flag(self.pause_download().await),
            ControlRequest::CancelDownload => flag(self.cancel_download().await),
            ControlRequest::IsDownloading => ControlResponse::Flag {
                value: self.is_downloading().await,
            },
            ControlRequest::RetryFailedDownloads => queue(self.retry_failed_downloads().await),
            ControlRequest::GetRuntimeMetrics => ControlResponse::Metrics {
                metrics: Box::new(self.get_runtime_metrics().await),
            },
        }
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("vodq")?.get_state_home();
    Ok(dir.join("control.sock"))
}

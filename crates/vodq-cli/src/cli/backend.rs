//! Where queue commands go: a live `vodq run` over its control socket, or an
//! orchestrator opened in this process on the same database.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use vodq_core::config::VodqConfig;
use vodq_core::control::{default_control_socket_path, ControlRequest, ControlResponse};
use vodq_core::metrics::RuntimeMetrics;
use vodq_core::orchestrator::Orchestrator;
use vodq_core::queue_db::{Job, QueueDb};

use crate::cli::control_socket;

pub enum Backend {
    Remote(PathBuf),
    Local(Orchestrator),
}

impl Backend {
    /// Prefer the socket of a running `vodq run`; otherwise open the queue here.
    pub async fn connect(cfg: VodqConfig) -> Result<Self> {
        if let Ok(path) = default_control_socket_path() {
            if control_socket::is_live(&path).await {
                tracing::debug!(path = %path.display(), "using live control socket");
                return Ok(Backend::Remote(path));
            }
        }
        let db = QueueDb::open_default().await?;
        Ok(Backend::Local(Orchestrator::open(cfg, db).await?))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Backend::Remote(_))
    }

    pub async fn request(&self, req: ControlRequest) -> Result<ControlResponse> {
        match self {
            Backend::Remote(path) => control_socket::send_request(path, &req).await,
            Backend::Local(orch) => Ok(orch.handle(req).await),
        }
    }

    pub async fn queue(&self, req: ControlRequest) -> Result<Vec<Job>> {
        match self.request(req).await? {
            ControlResponse::Queue { jobs } => Ok(jobs),
            other => Err(unexpected(other)),
        }
    }

    pub async fn flag(&self, req: ControlRequest) -> Result<bool> {
        match self.request(req).await? {
            ControlResponse::Flag { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn metrics(&self) -> Result<RuntimeMetrics> {
        match self.request(ControlRequest::GetRuntimeMetrics).await? {
            ControlResponse::Metrics { metrics } => Ok(*metrics),
            other => Err(unexpected(other)),
        }
    }

    /// Against a live run this also restarts its session; locally the jobs
    /// are only re-queued so nothing is spawned by a short-lived command.
    pub async fn retry_failed(&self) -> Result<Vec<Job>> {
        match self {
            Backend::Remote(_) => self.queue(ControlRequest::RetryFailedDownloads).await,
            Backend::Local(orch) => Ok(orch.requeue_failed().await?),
        }
    }

    /// A local orchestrator does not outlive the command: whatever it started
    /// is paused so the next `vodq run` resumes it.
    pub async fn close(self) -> Result<()> {
        if let Backend::Local(orch) = self {
            orch.shutdown().await?;
        }
        Ok(())
    }
}

fn unexpected(resp: ControlResponse) -> anyhow::Error {
    match resp {
        ControlResponse::Error { code, message } => anyhow!("{} ({})", message, code),
        other => anyhow!("unexpected control response: {:?}", other),
    }
}

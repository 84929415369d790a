//! `vodq start`, `vodq pause`, `vodq cancel`, `vodq retry-failed`.
//!
//! Against a live `vodq run` these steer its session. Without one there is
//! nothing downloading, so pause/cancel report that and retry-failed only
//! re-queues (the jobs start on the next `vodq run`).

use anyhow::Result;
use vodq_core::control::ControlRequest;
use vodq_core::queue_db::JobStatus;
use vodq_core::runner::StopKind;

use crate::cli::backend::Backend;

pub async fn run_start(backend: &Backend) -> Result<()> {
    if !backend.is_remote() {
        println!("No `vodq run` is active; start one to download the queue.");
        return Ok(());
    }
    if backend.flag(ControlRequest::StartDownload).await? {
        println!("Downloading.");
    } else {
        println!("Nothing to download.");
    }
    Ok(())
}

pub async fn run_stop(backend: &Backend, kind: StopKind) -> Result<()> {
    let (req, verb) = match kind {
        StopKind::Pause => (ControlRequest::PauseDownload, "Paused"),
        StopKind::Cancel => (ControlRequest::CancelDownload, "Cancelled"),
    };
    if backend.flag(req).await? {
        println!("{verb} the active download.");
    } else {
        println!("Nothing is downloading.");
    }
    Ok(())
}

pub async fn run_retry_failed(backend: &Backend) -> Result<()> {
    let failed = backend
        .queue(ControlRequest::GetQueue)
        .await?
        .iter()
        .filter(|j| j.status == JobStatus::Error)
        .count();
    backend.retry_failed().await?;
    if backend.is_remote() {
        println!("Re-queued {failed} failed job(s).");
    } else {
        println!("Re-queued {failed} failed job(s); `vodq run` will download them.");
    }
    Ok(())
}

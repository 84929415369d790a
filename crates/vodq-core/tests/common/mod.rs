#![allow(dead_code)]

pub mod fake_tool;

use std::time::Duration;

use tokio::sync::broadcast;
use vodq_core::orchestrator::QueueEvent;
use vodq_core::queue_db::{Candidate, JobId, JobStatus};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(15);

pub fn candidate(url: &str, title: &str) -> Candidate {
    Candidate {
        url: url.to_string(),
        title: title.to_string(),
        date: "2024-03-09".to_string(),
        streamer: "teststreamer".to_string(),
        duration_label: "1m".to_string(),
        custom_clip: None,
    }
}

/// Wait for the first event `pick` maps to `Some`.
pub async fn wait_for<T>(
    rx: &mut broadcast::Receiver<QueueEvent>,
    mut pick: impl FnMut(&QueueEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if let Some(v) = pick(&ev) {
                        return v;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("expected event did not arrive in time")
}

/// Next `DownloadFinished` for any job.
pub async fn next_finished(
    rx: &mut broadcast::Receiver<QueueEvent>,
) -> (JobId, JobStatus, Option<String>) {
    wait_for(rx, |ev| match ev {
        QueueEvent::DownloadFinished {
            job_id,
            status,
            error,
        } => Some((*job_id, *status, error.clone())),
        _ => None,
    })
    .await
}

/// Wait until `id` finishes with `status`, skipping other finishes.
pub async fn finished_with(
    rx: &mut broadcast::Receiver<QueueEvent>,
    id: JobId,
    want: JobStatus,
) {
    wait_for(rx, |ev| match ev {
        QueueEvent::DownloadFinished { job_id, status, .. } if *job_id == id && *status == want => {
            Some(())
        }
        _ => None,
    })
    .await
}

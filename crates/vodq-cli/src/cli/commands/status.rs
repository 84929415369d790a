//! `vodq status` – show the queue in order.

use anyhow::Result;
use vodq_core::control::ControlRequest;
use vodq_core::queue_db::{Job, JobStatus};

use crate::cli::backend::Backend;

pub async fn run_status(backend: &Backend) -> Result<()> {
    let jobs = backend.queue(ControlRequest::GetQueue).await?;
    print_jobs(&jobs);
    Ok(())
}

pub fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("Queue is empty.");
        return;
    }
    println!(
        "{:<6} {:<12} {:>7} {:<12} {:<8} {}",
        "ID", "STATUS", "PCT", "SPEED", "ATTEMPT", "TITLE"
    );
    for j in jobs {
        println!(
            "{:<6} {:<12} {:>6.1}% {:<12} {:<8} {}",
            j.id,
            j.status.as_str(),
            j.progress.progress_percent,
            j.progress.speed.as_deref().unwrap_or("-"),
            j.attempt,
            j.title
        );
        if j.status == JobStatus::Error {
            if let Some(err) = &j.last_error {
                let class = j.error_class.map(|c| c.as_str()).unwrap_or("unknown");
                let retry = if j.retry_exhausted {
                    "retries exhausted".to_string()
                } else if j.retry_at_ms.is_some() {
                    "retry scheduled".to_string()
                } else {
                    "not retried".to_string()
                };
                println!("       {} [{}; {}]", err, class, retry);
            }
        }
    }
}

//! `vodq clear-completed` – drop completed jobs.

use anyhow::Result;
use vodq_core::control::ControlRequest;

use crate::cli::backend::Backend;

pub async fn run_clear_completed(backend: &Backend) -> Result<()> {
    let before = backend.queue(ControlRequest::GetQueue).await?.len();
    let jobs = backend.queue(ControlRequest::ClearCompleted).await?;
    println!(
        "Cleared {} completed job(s); {} left",
        before.saturating_sub(jobs.len()),
        jobs.len()
    );
    Ok(())
}

//! `vodq remove <id>` – remove a job that is not downloading.

use anyhow::Result;
use vodq_core::control::ControlRequest;

use crate::cli::backend::Backend;

pub async fn run_remove(backend: &Backend, id: i64) -> Result<()> {
    let jobs = backend.queue(ControlRequest::RemoveFromQueue { id }).await?;
    println!("Removed job {id}; {} job(s) left", jobs.len());
    Ok(())
}

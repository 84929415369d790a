//! `vodq reorder <ids...>` – set the queue order.

use anyhow::Result;
use vodq_core::control::ControlRequest;

use super::print_jobs;
use crate::cli::backend::Backend;

pub async fn run_reorder(backend: &Backend, ids: Vec<i64>) -> Result<()> {
    let jobs = backend.queue(ControlRequest::ReorderQueue { ids }).await?;
    print_jobs(&jobs);
    Ok(())
}

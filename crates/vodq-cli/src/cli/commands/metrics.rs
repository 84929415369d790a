//! `vodq metrics` – print the runtime metrics snapshot.

use anyhow::Result;

use crate::cli::backend::Backend;

pub async fn run_metrics(backend: &Backend) -> Result<()> {
    let metrics = backend.metrics().await?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

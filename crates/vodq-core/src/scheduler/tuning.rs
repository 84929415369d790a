//! Performance-mode knobs for the external downloader.

use std::time::Duration;

use crate::config::{DownloaderConfig, PerformanceMode};

const MIN_TIMEOUT: Duration = Duration::from_millis(500);
const STABILITY_RATE_LIMIT: &str = "4M";

/// Per-run limits handed to the job runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    pub first_output_timeout: Duration,
    pub stall_timeout: Duration,
    /// Parallel fragment downloads inside the one external process.
    pub threads: u32,
    /// Value for the downloader's rate-limit option, if any.
    pub rate_limit: Option<String>,
}

impl Tuning {
    pub fn for_mode(mode: PerformanceMode, dl: &DownloaderConfig) -> Self {
        let first = Duration::from_secs(dl.first_output_timeout_secs);
        let stall = Duration::from_secs(dl.stall_timeout_secs.max(1));
        match mode {
            PerformanceMode::Stability => Self {
                first_output_timeout: (first / 2).max(MIN_TIMEOUT),
                stall_timeout: (stall / 2).max(MIN_TIMEOUT),
                threads: 1,
                rate_limit: Some(STABILITY_RATE_LIMIT.to_string()),
            },
            PerformanceMode::Balanced => Self {
                first_output_timeout: first,
                stall_timeout: stall,
                threads: 4,
                rate_limit: None,
            },
            PerformanceMode::Speed => Self {
                first_output_timeout: first,
                stall_timeout: stall,
                threads: 8,
                rate_limit: None,
            },
        }
    }
}

//! Runtime counters and the on-demand metrics snapshot.
//!
//! Counters are lifetime atomics; the snapshot is computed fresh on every
//! call and never stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metadata_cache::MetadataCacheStats;
use crate::queue_db::{unix_millis, Job, JobId, JobStatus};
use crate::retry::ErrorClass;

/// Number of jobs per status. `total` always equals the queue length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub pending: usize,
    pub downloading: usize,
    pub paused: usize,
    pub completed: usize,
    pub error: usize,
    pub total: usize,
}

impl QueueCounts {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut c = QueueCounts {
            total: jobs.len(),
            ..Default::default()
        };
        for j in jobs {
            match j.status {
                JobStatus::Pending => c.pending += 1,
                JobStatus::Downloading => c.downloading += 1,
                JobStatus::Paused => c.paused += 1,
                JobStatus::Completed => c.completed += 1,
                JobStatus::Error => c.error += 1,
            }
        }
        c
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJob {
    pub id: JobId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeMetrics {
    pub queue: QueueCounts,
    pub cache: MetadataCacheStats,
    pub downloads_started: u64,
    pub downloads_completed: u64,
    pub downloads_failed: u64,
    pub total_bytes: u64,
    pub integrity_failures: u64,
    pub retries_scheduled: u64,
    pub retries_exhausted: u64,
    /// Bytes per second reported by the running download, 0 when idle.
    pub current_throughput_bps: f64,
    /// Completed bytes over total time spent downloading.
    pub average_throughput_bps: f64,
    pub active_job: Option<ActiveJob>,
    pub last_error_class: Option<ErrorClass>,
    pub last_retry_delay_seconds: Option<f64>,
    pub generated_at_ms: i64,
}

#[derive(Debug, Default)]
struct LastFailure {
    class: Option<ErrorClass>,
    retry_delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct Metrics {
    downloads_started: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    total_bytes: AtomicU64,
    integrity_failures: AtomicU64,
    retries_scheduled: AtomicU64,
    retries_exhausted: AtomicU64,
    busy_millis: AtomicU64,
    current_bps: AtomicU64,
    last: Mutex<LastFailure>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn last(&self) -> std::sync::MutexGuard<'_, LastFailure> {
        self.last.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record_started(&self) {
        self.downloads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, bytes: u64) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failed(&self, class: ErrorClass) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
        if class == ErrorClass::Integrity {
            self.integrity_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.last().class = Some(class);
    }

    pub fn record_retry_scheduled(&self, delay: Duration) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        self.last().retry_delay = Some(delay);
    }

    pub fn record_retry_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Account wall time spent with a download process running.
    pub fn record_busy(&self, elapsed: Duration) {
        self.busy_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_current_throughput(&self, bytes_per_sec: f64) {
        let v = if bytes_per_sec.is_finite() && bytes_per_sec > 0.0 {
            bytes_per_sec.round() as u64
        } else {
            0
        };
        self.current_bps.store(v, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        jobs: &[Job],
        cache: MetadataCacheStats,
        active_job: Option<ActiveJob>,
    ) -> RuntimeMetrics {
        let total_bytes = self.total_bytes.load(Ordering::Relaxed);
        let busy_secs = self.busy_millis.load(Ordering::Relaxed) as f64 / 1000.0;
        let average = if busy_secs > 0.0 {
            total_bytes as f64 / busy_secs
        } else {
            0.0
        };
        let current = if active_job.is_some() {
            self.current_bps.load(Ordering::Relaxed) as f64
        } else {
            0.0
        };
        let last = self.last();
        RuntimeMetrics {
            queue: QueueCounts::from_jobs(jobs),
            cache,
            downloads_started: self.downloads_started.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            total_bytes,
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            current_throughput_bps: current,
            average_throughput_bps: average,
            active_job,
            last_error_class: last.class,
            last_retry_delay_seconds: last.retry_delay.map(|d| d.as_secs_f64()),
            generated_at_ms: unix_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_db::JobProgress;

    fn job(id: JobId, status: JobStatus) -> Job {
        Job {
            id,
            url: String::new(),
            title: String::new(),
            date: String::new(),
            streamer: String::new(),
            duration_label: String::new(),
            status,
            progress: JobProgress::default(),
            last_error: None,
            custom_clip: None,
            attempt: 1,
            retry_at_ms: None,
            error_class: None,
            retry_exhausted: false,
            output_path: None,
        }
    }

    #[test]
    fn queue_counts_sum_to_total() {
        let jobs = vec![
            job(1, JobStatus::Pending),
            job(2, JobStatus::Pending),
            job(3, JobStatus::Downloading),
            job(4, JobStatus::Completed),
            job(5, JobStatus::Error),
            job(6, JobStatus::Paused),
        ];
        let c = QueueCounts::from_jobs(&jobs);
        assert_eq!(c.pending, 2);
        assert_eq!(c.total, 6);
        assert_eq!(
            c.pending + c.downloading + c.paused + c.completed + c.error,
            c.total
        );
    }

    #[test]
    fn counters_and_last_failure() {
        let m = Metrics::new();
        m.record_started();
        m.record_failed(ErrorClass::Integrity);
        m.record_retry_scheduled(Duration::from_millis(2500));
        m.record_started();
        m.record_completed(4_000);
        m.record_busy(Duration::from_secs(2));
        m.set_current_throughput(1234.4);

        let idle = m.snapshot(&[], MetadataCacheStats::default(), None);
        assert_eq!(idle.downloads_started, 2);
        assert_eq!(idle.downloads_completed, 1);
        assert_eq!(idle.downloads_failed, 1);
        assert_eq!(idle.integrity_failures, 1);
        assert_eq!(idle.retries_scheduled, 1);
        assert_eq!(idle.last_error_class, Some(ErrorClass::Integrity));
        assert_eq!(idle.last_retry_delay_seconds, Some(2.5));
        assert_eq!(idle.average_throughput_bps, 2_000.0);
        assert_eq!(idle.current_throughput_bps, 0.0);

        let busy = m.snapshot(
            &[],
            MetadataCacheStats::default(),
            Some(ActiveJob {
                id: 1,
                title: "t".into(),
            }),
        );
        assert_eq!(busy.current_throughput_bps, 1234.0);
        assert!(busy.generated_at_ms > 0);
    }
}

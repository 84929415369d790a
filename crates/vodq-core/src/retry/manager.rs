//! Applies the retry policy to jobs and keeps per-session failure counts.

use std::collections::HashMap;
use std::time::Duration;

use crate::queue_db::{Job, JobId, JobStatus};
use crate::retry::classify::Failure;
use crate::retry::policy::{RetryDecision, RetryPolicy};

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A retry is armed for `retry_at_ms`.
    Scheduled { delay: Duration, retry_at_ms: i64 },
    /// Retryable class, but no attempts left.
    Exhausted,
    /// Class is not retryable.
    Terminal,
}

#[derive(Debug)]
pub struct RetryManager {
    policy: RetryPolicy,
    session_failures: HashMap<JobId, u32>,
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            session_failures: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Move `job` to `error` for `failure` and arm a retry when allowed.
    pub fn on_failure(&mut self, job: &mut Job, failure: &Failure, now_ms: i64) -> RetryOutcome {
        *self.session_failures.entry(job.id).or_insert(0) += 1;

        job.status = JobStatus::Error;
        job.last_error = Some(failure.message.clone());
        job.error_class = Some(failure.class);
        job.retry_at_ms = None;

        match self.policy.decide(job.attempt, failure.class) {
            RetryDecision::NoRetry => RetryOutcome::Terminal,
            RetryDecision::Exhausted => {
                job.retry_exhausted = true;
                RetryOutcome::Exhausted
            }
            RetryDecision::RetryAfter(delay) => {
                let retry_at_ms = now_ms.saturating_add(delay.as_millis() as i64);
                job.attempt += 1;
                job.retry_at_ms = Some(retry_at_ms);
                RetryOutcome::Scheduled { delay, retry_at_ms }
            }
        }
    }

    /// Manual re-queue: a fresh attempt budget regardless of class.
    pub fn rearm(job: &mut Job) {
        job.status = JobStatus::Pending;
        job.attempt = 1;
        job.retry_at_ms = None;
        job.retry_exhausted = false;
        job.last_error = None;
        job.error_class = None;
    }

    /// True if `job` is in `error` with an armed retry that has come due.
    pub fn is_due(job: &Job, now_ms: i64) -> bool {
        job.status == JobStatus::Error
            && !job.retry_exhausted
            && job.retry_at_ms.is_some_and(|at| at <= now_ms)
    }

    /// Turn a due armed retry back into a pending job. Keeps `attempt`.
    pub fn promote(job: &mut Job) {
        job.status = JobStatus::Pending;
        job.retry_at_ms = None;
        job.last_error = None;
    }

    /// Failures recorded for `id` since this process started.
    pub fn session_failures(&self, id: JobId) -> u32 {
        self.session_failures.get(&id).copied().unwrap_or(0)
    }

    pub fn forget(&mut self, id: JobId) {
        self.session_failures.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_db::JobProgress;
    use crate::retry::ErrorClass;

    fn job() -> Job {
        Job {
            id: 7,
            url: "https://v/7".into(),
            title: "t".into(),
            date: String::new(),
            streamer: String::new(),
            duration_label: String::new(),
            status: JobStatus::Downloading,
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

    fn manager(max_attempts: u32) -> RetryManager {
        RetryManager::new(RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        })
    }

    #[test]
    fn retryable_failure_arms_retry_then_exhausts() {
        let mut m = manager(2);
        let mut j = job();
        let net = Failure::new(ErrorClass::Network, "connection reset");

        let out = m.on_failure(&mut j, &net, 1_000);
        assert_eq!(
            out,
            RetryOutcome::Scheduled {
                delay: Duration::from_secs(1),
                retry_at_ms: 2_000
            }
        );
        assert_eq!(j.status, JobStatus::Error);
        assert_eq!(j.attempt, 2);
        assert_eq!(j.last_error.as_deref(), Some("connection reset"));
        assert!(!RetryManager::is_due(&j, 1_999));
        assert!(RetryManager::is_due(&j, 2_000));

        RetryManager::promote(&mut j);
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.attempt, 2);
        assert!(j.last_error.is_none());

        let out = m.on_failure(&mut j, &net, 3_000);
        assert_eq!(out, RetryOutcome::Exhausted);
        assert!(j.retry_exhausted);
        assert!(j.retry_at_ms.is_none());
        assert!(!RetryManager::is_due(&j, i64::MAX));
        assert_eq!(m.session_failures(7), 2);
    }

    #[test]
    fn terminal_failure_is_not_armed() {
        let mut m = manager(5);
        let mut j = job();
        let out = m.on_failure(&mut j, &Failure::new(ErrorClass::NotFound, "gone"), 0);
        assert_eq!(out, RetryOutcome::Terminal);
        assert_eq!(j.status, JobStatus::Error);
        assert_eq!(j.error_class, Some(ErrorClass::NotFound));
        assert!(j.retry_at_ms.is_none());
        assert!(!j.retry_exhausted);
    }

    #[test]
    fn rearm_resets_budget() {
        let mut m = manager(1);
        let mut j = job();
        m.on_failure(&mut j, &Failure::new(ErrorClass::Timeout, "stalled"), 0);
        assert!(j.retry_exhausted);

        RetryManager::rearm(&mut j);
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.attempt, 1);
        assert!(!j.retry_exhausted);
        assert!(j.last_error.is_none());
        assert!(j.error_class.is_none());

        m.forget(j.id);
        assert_eq!(m.session_failures(j.id), 0);
    }
}

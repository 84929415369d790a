use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::UnknownName;

/// High-level classification of a failed download for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connection reset, DNS, refused, 5xx.
    Network,
    /// No output within the first-output window, or output stalled.
    Timeout,
    /// Upstream asked us to slow down (429).
    Throttled,
    /// Tool exited non-zero for an unrecognized reason, or died on a signal.
    ToolCrash,
    /// Post-download validation of the produced file failed.
    Integrity,
    /// Syntactically invalid URL or arguments the tool rejected.
    MalformedInput,
    /// The VOD/clip does not exist or is not accessible.
    NotFound,
    /// Stopped by the user.
    Cancelled,
    /// The downloader binary could not be started.
    ToolMissing,
    /// The output location could not be prepared.
    Storage,
}

impl ErrorClass {
    /// Only these classes are re-armed automatically.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorClass::Network
                | ErrorClass::Timeout
                | ErrorClass::Throttled
                | ErrorClass::ToolCrash
                | ErrorClass::Integrity
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Throttled => "throttled",
            ErrorClass::ToolCrash => "tool_crash",
            ErrorClass::Integrity => "integrity",
            ErrorClass::MalformedInput => "malformed_input",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::ToolMissing => "tool_missing",
            ErrorClass::Storage => "storage",
        }
    }
}

impl std::str::FromStr for ErrorClass {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "network" => ErrorClass::Network,
            "timeout" => ErrorClass::Timeout,
            "throttled" => ErrorClass::Throttled,
            "tool_crash" => ErrorClass::ToolCrash,
            "integrity" => ErrorClass::Integrity,
            "malformed_input" => ErrorClass::MalformedInput,
            "not_found" => ErrorClass::NotFound,
            "cancelled" => ErrorClass::Cancelled,
            "tool_missing" => ErrorClass::ToolMissing,
            "storage" => ErrorClass::Storage,
            _ => {
                return Err(UnknownName {
                    kind: "error class",
                    value: s.to_string(),
                })
            }
        })
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminal class: do not retry.
    NoRetry,
    /// Retryable class but the attempt budget is spent.
    Exhausted,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Backoff for a failed `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// Decide what happens after `attempt` (1-based) failed with `class`.
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        if !class.is_retryable() {
            return RetryDecision::NoRetry;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }
}

//! Types used by the queue database.

use serde::{Deserialize, Serialize};

use crate::config::DuplicateKey;
use crate::error::{QueueError, UnknownName};
use crate::retry::ErrorClass;

/// Job identifier.
pub type JobId = i64;

/// Job status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "downloading" => Ok(JobStatus::Downloading),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            _ => Err(UnknownName {
                kind: "job status",
                value: s.to_string(),
            }),
        }
    }
}

/// Trim bounds for a clip job. Immutable once the job exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomClip {
    pub start_sec: f64,
    pub duration_sec: f64,
    #[serde(default)]
    pub start_part: u32,
    /// `simple`, `timestamped` or `template`.
    #[serde(default)]
    pub filename_format: String,
    #[serde(default)]
    pub filename_template: Option<String>,
}

impl CustomClip {
    pub fn end_sec(&self) -> f64 {
        self.start_sec + self.duration_sec
    }

    fn same_range(&self, other: &CustomClip) -> bool {
        (self.start_sec - other.start_sec).abs() < 1e-3
            && (self.duration_sec - other.duration_sec).abs() < 1e-3
    }
}

/// Live transfer figures, written only by the job runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub progress_percent: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub current_part: u32,
    pub total_parts: u32,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

/// Request to enqueue a download, as received from the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub streamer: String,
    #[serde(default)]
    pub duration_label: String,
    #[serde(default)]
    pub custom_clip: Option<CustomClip>,
}

impl Candidate {
    /// Boundary validation. URL syntax is deliberately not checked here: a
    /// syntactically broken URL is queued and fails in the runner.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.url.trim().is_empty() {
            return Err(QueueError::InvalidArgument("url must not be empty".into()));
        }
        if self.title.trim().is_empty() {
            return Err(QueueError::InvalidArgument("title must not be empty".into()));
        }
        if let Some(clip) = &self.custom_clip {
            if !(clip.duration_sec.is_finite() && clip.duration_sec > 0.0) {
                return Err(QueueError::InvalidArgument(
                    "customClip.durationSec must be greater than zero".into(),
                ));
            }
            if !(clip.start_sec.is_finite() && clip.start_sec >= 0.0) {
                return Err(QueueError::InvalidArgument(
                    "customClip.startSec must be a non-negative number".into(),
                ));
            }
        }
        Ok(())
    }
}

/// One queued download and its execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub title: String,
    pub date: String,
    pub streamer: String,
    pub duration_label: String,
    pub status: JobStatus,
    #[serde(flatten)]
    pub progress: JobProgress,
    pub last_error: Option<String>,
    pub custom_clip: Option<CustomClip>,
    /// 1-based number of the current (or next) attempt.
    pub attempt: u32,
    /// Unix ms before which an automatic retry must not start.
    pub retry_at_ms: Option<i64>,
    pub error_class: Option<ErrorClass>,
    pub retry_exhausted: bool,
    pub output_path: Option<String>,
}

impl Job {
    /// True if `candidate` describes the same download under `key`.
    pub fn matches(&self, candidate: &Candidate, key: DuplicateKey) -> bool {
        if self.url != candidate.url {
            return false;
        }
        match key {
            DuplicateKey::UrlTitle => self.title == candidate.title,
            DuplicateKey::UrlStreamerRange => {
                self.streamer == candidate.streamer
                    && match (&self.custom_clip, &candidate.custom_clip) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.same_range(b),
                        _ => false,
                    }
            }
        }
    }
}

//! Classify a failed downloader run into an [`ErrorClass`] plus a
//! human-readable reason for `last_error`.

use std::fmt;

use crate::retry::policy::ErrorClass;

/// A classified failure. `message` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub class: ErrorClass,
    pub message: String,
}

impl Failure {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = format!("download failed ({})", class.as_str());
        }
        Self { class, message }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Ordered stderr patterns; the first match wins.
const PATTERNS: &[(&str, ErrorClass, &str)] = &[
    ("http error 429", ErrorClass::Throttled, "server returned 429 (too many requests)"),
    ("too many requests", ErrorClass::Throttled, "server returned 429 (too many requests)"),
    ("http error 404", ErrorClass::NotFound, "video not found (404)"),
    ("http error 403", ErrorClass::NotFound, "access denied (403); the video may be private or sub-only"),
    ("private video", ErrorClass::NotFound, "this video is private"),
    ("video unavailable", ErrorClass::NotFound, "video unavailable or removed"),
    ("does not exist", ErrorClass::NotFound, "video does not exist"),
    ("unsupported url", ErrorClass::MalformedInput, "unsupported url"),
    ("is not a valid url", ErrorClass::MalformedInput, "invalid url"),
    ("no such option", ErrorClass::MalformedInput, "downloader rejected its arguments"),
    ("timed out", ErrorClass::Timeout, "connection timed out"),
    ("timeout", ErrorClass::Timeout, "connection timed out"),
    ("http error 5", ErrorClass::Network, "upstream server error (5xx)"),
    ("connection reset", ErrorClass::Network, "connection reset"),
    ("connection refused", ErrorClass::Network, "connection refused"),
    ("temporary failure in name resolution", ErrorClass::Network, "dns resolution failed"),
    ("name or service not known", ErrorClass::Network, "dns resolution failed"),
    ("network is unreachable", ErrorClass::Network, "network is unreachable"),
    ("unable to download", ErrorClass::Network, "unable to download"),
];

/// Classify a non-successful exit. `exit_code` is `None` when the process was
/// terminated by a signal. `stderr_tail` holds the last lines the tool wrote.
pub fn classify_exit(exit_code: Option<i32>, stderr_tail: &[String]) -> Failure {
    let joined = stderr_tail.join("\n");
    let lower = joined.to_lowercase();

    for (needle, class, reason) in PATTERNS {
        if lower.contains(needle) {
            return Failure::new(*class, with_detail(reason, last_error_line(stderr_tail)));
        }
    }

    let detail = last_error_line(stderr_tail)
        .or_else(|| stderr_tail.iter().rev().find(|l| !l.trim().is_empty()).map(|l| l.trim()));
    let base = match exit_code {
        Some(code) => format!("downloader exited with code {}", code),
        None => "downloader was killed by a signal".to_string(),
    };
    Failure::new(ErrorClass::ToolCrash, with_detail(&base, detail))
}

fn last_error_line(lines: &[String]) -> Option<&str> {
    lines
        .iter()
        .rev()
        .map(|l| l.trim())
        .find(|l| l.to_lowercase().starts_with("error"))
}

fn with_detail(reason: &str, detail: Option<&str>) -> String {
    match detail {
        Some(d) if !d.is_empty() => format!("{}: {}", reason, d),
        _ => reason.to_string(),
    }
}

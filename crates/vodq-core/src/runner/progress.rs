//! Parse downloader output lines into progress samples and merge them into
//! a job's progress without letting any counter go backwards.

use crate::queue_db::JobProgress;

/// Everything one output line said about the transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    pub percent: Option<f64>,
    pub total_bytes: Option<u64>,
    /// Total was prefixed with `~` (fragmented download estimate).
    pub total_is_estimate: bool,
    pub speed: Option<String>,
    pub eta: Option<String>,
    /// `(frag current/total)`.
    pub fragment: Option<(u32, u32)>,
    /// File announced by a `Destination:` or merger line.
    pub destination: Option<String>,
}

impl ProgressSample {
    fn is_empty(&self) -> bool {
        self == &ProgressSample::default()
    }

    /// Bytes implied by percent and total, if both are known.
    pub fn downloaded_bytes(&self) -> Option<u64> {
        let pct = self.percent?;
        let total = self.total_bytes?;
        Some(((pct.clamp(0.0, 100.0) / 100.0) * total as f64).round() as u64)
    }
}

/// Parse one line such as
/// `[download]  42.5% of ~1.23GiB at  3.45MiB/s ETA 05:12 (frag 12/345)`.
/// Returns `None` for lines that carry no progress information.
pub fn parse_line(line: &str) -> Option<ProgressSample> {
    let line = line.trim();
    let mut sample = ProgressSample::default();

    if let Some(idx) = line.find("Destination: ") {
        let dest = line[idx + "Destination: ".len()..].trim();
        if !dest.is_empty() {
            sample.destination = Some(dest.to_string());
        }
        return Some(sample);
    }
    if line.starts_with("[Merger]") {
        if let Some(dest) = quoted(line) {
            sample.destination = Some(dest.to_string());
            return Some(sample);
        }
        return None;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i];
        let next = tokens.get(i + 1).copied();
        if let Some(num) = tok.strip_suffix('%') {
            if let Ok(v) = num.parse::<f64>() {
                if v.is_finite() {
                    sample.percent = Some(v.clamp(0.0, 100.0));
                }
            }
        } else if tok == "of" {
            let mut size_tok = next;
            if size_tok == Some("~") {
                i += 1;
                size_tok = tokens.get(i + 1).copied();
                sample.total_is_estimate = true;
            }
            if let Some(s) = size_tok {
                let s = match s.strip_prefix('~') {
                    Some(rest) => {
                        sample.total_is_estimate = true;
                        rest
                    }
                    None => s,
                };
                sample.total_bytes = parse_size(s);
                i += 1;
            }
        } else if tok == "at" {
            if let Some(s) = next.filter(|s| is_known(s)) {
                sample.speed = Some(s.to_string());
            }
            i += 1;
        } else if tok == "ETA" {
            if let Some(s) = next.filter(|s| is_known(s)) {
                sample.eta = Some(s.to_string());
            }
            i += 1;
        } else if tok == "(frag" {
            if let Some(pair) = next.map(|s| s.trim_end_matches(')')) {
                if let Some((a, b)) = pair.split_once('/') {
                    if let (Ok(a), Ok(b)) = (a.parse::<u32>(), b.parse::<u32>()) {
                        sample.fragment = Some((a, b));
                    }
                }
            }
            i += 1;
        }
        i += 1;
    }

    if sample.is_empty() {
        None
    } else {
        Some(sample)
    }
}

fn is_known(s: &str) -> bool {
    !s.is_empty() && !s.eq_ignore_ascii_case("unknown") && !s.starts_with("N/A")
}

fn quoted(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let end = line[start..].find('"')? + start;
    Some(&line[start..end])
}

/// Parse a size like `1.23GiB`, `512KiB`, `3.5MB` or `800B` into bytes.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.parse().ok()?;
    let mult: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * mult).round() as u64)
}

/// `3.45MiB/s` → bytes per second.
pub fn speed_bytes_per_sec(s: &str) -> Option<f64> {
    let bytes = parse_size(s.trim().strip_suffix("/s")?)?;
    Some(bytes as f64)
}

/// Merge `sample` into `progress`. Percent, byte and part counters only move
/// forward; a missing speed/ETA keeps the previous value. Returns true if
/// anything changed.
pub fn merge(progress: &mut JobProgress, sample: &ProgressSample) -> bool {
    let before = progress.clone();

    if let Some(pct) = sample.percent {
        if pct > progress.progress_percent {
            progress.progress_percent = pct;
        }
    }
    if let Some(total) = sample.total_bytes {
        progress.total_bytes = progress.total_bytes.max(total);
    }
    if let Some(done) = sample.downloaded_bytes() {
        progress.downloaded_bytes = progress.downloaded_bytes.max(done);
    }
    if let Some(speed) = sample.speed.as_ref().filter(|s| !is_zero(s)) {
        progress.speed = Some(speed.clone());
    }
    if let Some(eta) = sample.eta.as_ref().filter(|s| !is_zero(s)) {
        progress.eta = Some(eta.clone());
    }
    if let Some((current, total)) = sample.fragment {
        progress.current_part = progress.current_part.max(current);
        progress.total_parts = progress.total_parts.max(total);
    }

    *progress != before
}

// "0B/s", "00:00" and "" all count as zero.
fn is_zero(s: &str) -> bool {
    s.chars().filter(|c| c.is_ascii_digit()).all(|c| c == '0')
}

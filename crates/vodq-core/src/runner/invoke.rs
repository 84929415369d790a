//! Build the downloader command line for one job.

use std::path::PathBuf;

use crate::config::DownloaderConfig;
use crate::queue_db::{CustomClip, JobId};
use crate::scheduler::Tuning;

const CLIP_ARGS_TOKEN: &str = "{clip_args}";
const RATE_LIMIT_ARGS_TOKEN: &str = "{rate_limit_args}";

/// One run of the external downloader.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub job_id: JobId,
    pub url: String,
    pub output_path: PathBuf,
    pub clip: Option<CustomClip>,
    pub tuning: Tuning,
}

/// Expand the configured argument template for `req`.
pub fn build_args(cfg: &DownloaderConfig, req: &DownloadRequest) -> Vec<String> {
    let mut out = Vec::with_capacity(cfg.args.len() + 4);
    for arg in &cfg.args {
        match arg.as_str() {
            CLIP_ARGS_TOKEN => {
                if req.clip.is_some() {
                    out.extend(cfg.clip_args.iter().map(|a| substitute(a, req)));
                }
            }
            RATE_LIMIT_ARGS_TOKEN => {
                if req.tuning.rate_limit.is_some() {
                    out.extend(cfg.rate_limit_args.iter().map(|a| substitute(a, req)));
                }
            }
            _ => out.push(substitute(arg, req)),
        }
    }
    out
}

fn substitute(template: &str, req: &DownloadRequest) -> String {
    let mut s = template
        .replace("{url}", &req.url)
        .replace("{output}", &req.output_path.to_string_lossy())
        .replace("{threads}", &req.tuning.threads.to_string())
        .replace("{rate_limit}", req.tuning.rate_limit.as_deref().unwrap_or(""));
    if let Some(clip) = &req.clip {
        s = s
            .replace("{start}", &format_secs(clip.start_sec))
            .replace("{end}", &format_secs(clip.end_sec()))
            .replace("{duration}", &format_secs(clip.duration_sec));
    }
    s
}

/// Seconds without trailing zeros: `30`, `45.5`, `12.125`.
fn format_secs(v: f64) -> String {
    let s = format!("{:.3}", v);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

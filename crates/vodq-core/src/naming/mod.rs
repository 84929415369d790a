//! Output file naming for finished downloads.
//!
//! Templates use `{id}`, `{title}`, `{streamer}` and `{date}`; clip templates
//! may also use `{start}` and `{end}` (rendered as `HH-MM-SS`).

mod sanitize;

use std::path::PathBuf;

use crate::config::VodqConfig;
use crate::queue_db::{CustomClip, Job};

pub use sanitize::{sanitize_component, NAME_MAX};

const DEFAULT_EXTENSION: &str = "mp4";
const KNOWN_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "ts", "flv", "mov", "m4a", "mp3"];

/// Where the downloader should write `job`.
pub fn output_path(cfg: &VodqConfig, job: &Job) -> PathBuf {
    cfg.effective_download_dir()
        .join(output_file_name(job, &cfg.filename_template))
}

/// Sanitized file name for `job`, always with a media extension.
pub fn output_file_name(job: &Job, template: &str) -> String {
    let rendered = match &job.custom_clip {
        None => render(template, job, None),
        Some(clip) => match clip.filename_format.as_str() {
            "template" => render(
                clip.filename_template.as_deref().unwrap_or(template),
                job,
                Some(clip),
            ),
            "timestamped" => format!(
                "{}_{}-{}",
                render(template, job, Some(clip)),
                hms(clip.start_sec),
                hms(clip.end_sec())
            ),
            _ => render(template, job, Some(clip)),
        },
    };

    let ext_room = DEFAULT_EXTENSION.len() + 1;
    let mut name = sanitize_component(&rendered, NAME_MAX - ext_room);
    if name.is_empty() {
        name = format!("video_{}", job.id);
    }
    if !has_media_extension(&name) {
        name.push('.');
        name.push_str(DEFAULT_EXTENSION);
    }
    name
}

fn render(template: &str, job: &Job, clip: Option<&CustomClip>) -> String {
    let mut s = template
        .replace("{id}", &job.id.to_string())
        .replace("{title}", &job.title)
        .replace("{streamer}", &job.streamer)
        .replace("{date}", &job.date);
    if let Some(clip) = clip {
        s = s
            .replace("{start}", &hms(clip.start_sec))
            .replace("{end}", &hms(clip.end_sec()));
    }
    s
}

fn hms(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{:02}-{:02}-{:02}", total / 3600, (total / 60) % 60, total % 60)
}

fn has_media_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

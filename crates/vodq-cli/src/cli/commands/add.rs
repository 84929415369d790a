//! `vodq add <url>` – queue a VOD or clip.

use anyhow::Result;
use clap::Args;
use vodq_core::control::ControlRequest;
use vodq_core::queue_db::{Candidate, CustomClip};

use crate::cli::backend::Backend;

#[derive(Debug, Args)]
pub struct AddArgs {
    /// VOD or clip URL handed to the downloader.
    pub url: String,

    /// Display title; also used in the output file name.
    #[arg(long)]
    pub title: String,

    #[arg(long, default_value = "")]
    pub streamer: String,

    /// Broadcast date, e.g. 2024-03-09.
    #[arg(long, default_value = "")]
    pub date: String,

    /// Human-readable length shown in status, e.g. "3h12m".
    #[arg(long, default_value = "")]
    pub duration_label: String,

    /// Clip start offset in seconds into the VOD.
    #[arg(long, value_name = "SECS", requires = "clip_duration")]
    pub clip_start: Option<f64>,

    /// Clip length in seconds.
    #[arg(long, value_name = "SECS", requires = "clip_start")]
    pub clip_duration: Option<f64>,
}

impl AddArgs {
    pub fn into_candidate(self) -> Candidate {
        let custom_clip = match (self.clip_start, self.clip_duration) {
            (Some(start_sec), Some(duration_sec)) => Some(CustomClip {
                start_sec,
                duration_sec,
                start_part: 0,
                filename_format: String::new(),
                filename_template: None,
            }),
            _ => None,
        };
        Candidate {
            url: self.url,
            title: self.title,
            date: self.date,
            streamer: self.streamer,
            duration_label: self.duration_label,
            custom_clip,
        }
    }
}

pub async fn run_add(backend: &Backend, args: AddArgs) -> Result<()> {
    let candidate = args.into_candidate();
    let before = backend.queue(ControlRequest::GetQueue).await?.len();
    let jobs = backend
        .queue(ControlRequest::AddToQueue {
            candidate: candidate.clone(),
        })
        .await?;

    let job = jobs
        .iter()
        .rev()
        .find(|j| j.url == candidate.url && j.title == candidate.title);
    match job {
        Some(j) if jobs.len() > before => println!("Added job {}: {}", j.id, j.title),
        Some(j) => println!("Already queued as job {} ({})", j.id, j.status.as_str()),
        None => println!("Already queued"),
    }
    Ok(())
}

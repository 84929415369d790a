//! Scripted stand-in for the external downloader.
//!
//! The tool is `sh -c <script> fake-dl <output> <url>`, so scripts see the
//! output path as `$1` and the URL as `$2`.

use std::path::Path;

use vodq_core::config::VodqConfig;

/// Writes a 1 KiB file and reports progress like yt-dlp does.
pub const SUCCESS: &str = r#"
printf '[download] Destination: %s\n' "$1"
printf '[download]  50.0%% of 1.00KiB at 2.00KiB/s ETA 00:01\n'
head -c 1024 /dev/zero > "$1"
printf '[download] 100%% of 1.00KiB at 2.00KiB/s ETA 00:00\n'
"#;

/// Reports some progress, leaves a partial file, then hangs.
pub const SLOW: &str = r#"
printf '[download]  10.0%% of 1.00KiB at 1.00KiB/s ETA 00:30 (frag 1/10)\n'
head -c 100 /dev/zero > "$1.part"
exec sleep 30
"#;

/// Never prints anything.
pub const SILENT: &str = "exec sleep 30";

/// Exits 0 without producing the file.
pub const NO_FILE: &str = r#"
printf '[download] 100%% of 1.00KiB at 2.00KiB/s ETA 00:00\n'
exit 0
"#;

/// The VOD is gone upstream.
pub const NOT_FOUND: &str = r#"
echo 'ERROR: [twitch:vod] v1: Video does not exist' >&2
exit 1
"#;

/// Fails with a 503 the first time (creating `marker`), succeeds afterwards.
pub fn flaky(marker: &Path) -> String {
    format!(
        r#"
if [ -e '{marker}' ]; then
{success}
else
  touch '{marker}'
  echo 'ERROR: unable to download video data: HTTP Error 503: Service Unavailable' >&2
  exit 1
fi
"#,
        marker = marker.display(),
        success = SUCCESS
    )
}

/// Engine config driving `script`, with short timers for tests.
pub fn config(download_dir: &Path, script: &str) -> VodqConfig {
    let mut cfg = VodqConfig {
        download_dir: Some(download_dir.to_path_buf()),
        filename_template: "{id}_{title}".to_string(),
        scheduler_tick_ms: 20,
        progress_flush_ms: 0,
        ..VodqConfig::default()
    };
    cfg.retry.max_attempts = 3;
    cfg.retry.base_delay_secs = 0.05;
    cfg.retry.max_delay_secs = 1;
    cfg.downloader.program = "sh".to_string();
    cfg.downloader.args = vec![
        "-c".to_string(),
        script.to_string(),
        "fake-dl".to_string(),
        "{output}".to_string(),
        "{url}".to_string(),
    ];
    cfg.downloader.first_output_timeout_secs = 10;
    cfg.downloader.stall_timeout_secs = 10;
    cfg.downloader.kill_grace_ms = 200;
    cfg
}

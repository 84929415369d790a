//! Run the external downloader for one job and watch it until it exits,
//! goes silent, or is told to stop.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::DownloaderConfig;
use crate::queue_db::JobId;
use crate::retry::{classify_exit, ErrorClass, Failure};

use super::integrity::validate_output;
use super::invoke::{build_args, DownloadRequest};
use super::progress::{parse_line, ProgressSample};

const STDERR_TAIL_LINES: usize = 20;
const LINE_CHANNEL_CAPACITY: usize = 256;
/// How long to keep reading buffered output after the process exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// User-requested stop of the active download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopKind {
    /// Keep partial output so the next start resumes.
    Pause,
    /// Discard partial output.
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { output: PathBuf, bytes: u64 },
    Failed(Failure),
    Stopped(StopKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Spawn the downloader for `req` and supervise it to completion.
///
/// Progress samples are sent on `progress_tx` in output order. A `Some` value
/// on `stop` (including one set before this call) terminates the process.
pub async fn run_download(
    cfg: &DownloaderConfig,
    req: &DownloadRequest,
    mut stop: watch::Receiver<Option<StopKind>>,
    progress_tx: mpsc::Sender<ProgressSample>,
) -> RunOutcome {
    if let Some(kind) = *stop.borrow_and_update() {
        return RunOutcome::Stopped(kind);
    }
    if let Err(f) = check_url(&req.url) {
        return RunOutcome::Failed(f);
    }
    if let Some(parent) = req
        .output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return RunOutcome::Failed(Failure::new(
                ErrorClass::Storage,
                format!("cannot create output directory {}: {}", parent.display(), e),
            ));
        }
    }

    let args = build_args(cfg, req);
    tracing::info!(job_id = req.job_id, program = %cfg.program, "spawning downloader");
    tracing::debug!(job_id = req.job_id, ?args, "downloader arguments");

    let mut cmd = Command::new(&cfg.program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        // Own process group so a stop signal also reaches helpers it spawned.
        cmd.process_group(0);
    }

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            let class = match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ErrorClass::ToolMissing
                }
                _ => ErrorClass::ToolCrash,
            };
            return RunOutcome::Failed(Failure::new(
                class,
                format!("cannot start {}: {}", cfg.program, e),
            ));
        }
    };

    let (line_tx, mut line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let mut readers = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        readers.push(spawn_reader(out, Stream::Stdout, line_tx.clone()));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(spawn_reader(err, Stream::Stderr, line_tx.clone()));
    }
    drop(line_tx);

    let mut output = OutputWatch::new(req.job_id, progress_tx);
    let grace = Duration::from_millis(cfg.kill_grace_ms);
    let started = Instant::now();
    let mut last_output: Option<Instant> = None;
    let mut lines_open = true;
    let mut stop_open = true;

    let status = loop {
        let deadline = match last_output {
            Some(t) => t.checked_add(req.tuning.stall_timeout),
            None => started.checked_add(req.tuning.first_output_timeout),
        };
        tokio::select! {
            changed = stop.changed(), if stop_open => {
                if changed.is_err() {
                    stop_open = false;
                    continue;
                }
                let requested = *stop.borrow_and_update();
                if let Some(kind) = requested {
                    tracing::info!(job_id = req.job_id, ?kind, "stopping downloader");
                    terminate(&mut child, grace).await;
                    abort_readers(&readers);
                    if kind == StopKind::Cancel {
                        cleanup_partial_output(&req.output_path).await;
                    }
                    return RunOutcome::Stopped(kind);
                }
            }
            line = line_rx.recv(), if lines_open => match line {
                Some((stream, text)) => {
                    last_output = Some(Instant::now());
                    output.handle(stream, &text).await;
                }
                None => lines_open = false,
            },
            status = child.wait() => break status,
            _ = sleep_until_opt(deadline) => {
                let message = match last_output {
                    Some(_) => format!(
                        "downloader stalled: no output for {}s",
                        req.tuning.stall_timeout.as_secs_f64()
                    ),
                    None => format!(
                        "downloader produced no output within {}s",
                        req.tuning.first_output_timeout.as_secs_f64()
                    ),
                };
                tracing::warn!(job_id = req.job_id, "{}", message);
                terminate(&mut child, grace).await;
                abort_readers(&readers);
                return RunOutcome::Failed(Failure::new(ErrorClass::Timeout, message));
            }
        }
    };

    if lines_open {
        let drain = async {
            while let Some((stream, text)) = line_rx.recv().await {
                output.handle(stream, &text).await;
            }
        };
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, drain).await;
    }
    abort_readers(&readers);

    let status = match status {
        Ok(s) => s,
        Err(e) => {
            return RunOutcome::Failed(Failure::new(
                ErrorClass::ToolCrash,
                format!("wait for downloader: {}", e),
            ))
        }
    };
    if !status.success() {
        let failure = classify_exit(status.code(), &output.stderr_tail());
        tracing::warn!(
            job_id = req.job_id,
            code = ?status.code(),
            class = failure.class.as_str(),
            "downloader failed: {}",
            failure.message
        );
        return RunOutcome::Failed(failure);
    }

    let produced = output.resolve_output(&req.output_path).await;
    match validate_output(&produced, output.expected_bytes()).await {
        Ok(bytes) => {
            tracing::info!(job_id = req.job_id, bytes, path = %produced.display(), "download finished");
            RunOutcome::Completed {
                output: produced,
                bytes,
            }
        }
        Err(failure) => {
            tracing::warn!(job_id = req.job_id, "output validation failed: {}", failure.message);
            RunOutcome::Failed(failure)
        }
    }
}

/// Only absolute http(s) URLs are handed to the downloader.
fn check_url(raw: &str) -> Result<(), Failure> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| Failure::new(ErrorClass::MalformedInput, format!("invalid url {:?}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        other => Err(Failure::new(
            ErrorClass::MalformedInput,
            format!("unsupported url {:?} (scheme {})", raw, other),
        )),
    }
}

fn spawn_reader<R>(
    reader: R,
    stream: Stream,
    tx: mpsc::Sender<(Stream, String)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    // Carriage-return progress bars put several updates on one line.
                    for part in text.trim_end_matches(['\r', '\n']).split('\r') {
                        if tx.send((stream, part.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    })
}

/// Sleep until `deadline`; a deadline past what `Instant` can hold never fires.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(t) => tokio::time::sleep_until(t).await,
        None => std::future::pending().await,
    }
}

fn abort_readers(readers: &[JoinHandle<()>]) {
    for r in readers {
        r.abort();
    }
}

/// SIGINT to the process group, wait up to `grace`, then kill.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pgid = pid as libc::pid_t;
            // SAFETY: kill(2) has no memory-safety preconditions.
            unsafe {
                libc::kill(-pgid, libc::SIGINT);
            }
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }
            tracing::warn!(pid, "downloader still running after grace period; killing");
            // SAFETY: as above.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;
    let _ = child.kill().await;
}

/// Remove the output file and the downloader's partial/fragment files next to it.
async fn cleanup_partial_output(output: &Path) {
    let _ = tokio::fs::remove_file(output).await;
    let Some(name) = output.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string();
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let partial = file_name.ends_with(".part")
            || file_name.ends_with(".ytdl")
            || file_name.contains(".part-Frag");
        if partial && file_name.starts_with(stem.as_str()) {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::debug!(path = %entry.path().display(), "remove partial file: {}", e);
            }
        }
    }
}

/// Per-run view of the downloader's output.
struct OutputWatch {
    job_id: JobId,
    progress_tx: mpsc::Sender<ProgressSample>,
    stderr_tail: VecDeque<String>,
    exact_total: Option<u64>,
    destinations: Vec<String>,
}

impl OutputWatch {
    fn new(job_id: JobId, progress_tx: mpsc::Sender<ProgressSample>) -> Self {
        Self {
            job_id,
            progress_tx,
            stderr_tail: VecDeque::with_capacity(STDERR_TAIL_LINES),
            exact_total: None,
            destinations: Vec::new(),
        }
    }

    async fn handle(&mut self, stream: Stream, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if stream == Stream::Stderr {
            if self.stderr_tail.len() == STDERR_TAIL_LINES {
                self.stderr_tail.pop_front();
            }
            self.stderr_tail.push_back(line.to_string());
        }
        let Some(sample) = parse_line(line) else {
            tracing::trace!(job_id = self.job_id, line, "downloader output");
            return;
        };
        if let Some(dest) = &sample.destination {
            if !self.destinations.contains(dest) {
                self.destinations.push(dest.clone());
            }
        }
        if let (Some(total), false) = (sample.total_bytes, sample.total_is_estimate) {
            self.exact_total = Some(total);
        }
        // Receiver gone means nobody is listening; keep supervising anyway.
        let _ = self.progress_tx.send(sample).await;
    }

    fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.iter().cloned().collect()
    }

    /// Announced size, only meaningful when a single stream was written.
    fn expected_bytes(&self) -> Option<u64> {
        if self.destinations.len() > 1 {
            None
        } else {
            self.exact_total
        }
    }

    /// The requested path, or the last announced file if the tool wrote elsewhere.
    async fn resolve_output(&self, requested: &Path) -> PathBuf {
        if tokio::fs::metadata(requested).await.is_ok() {
            return requested.to_path_buf();
        }
        for dest in self.destinations.iter().rev() {
            let p = PathBuf::from(dest);
            if tokio::fs::metadata(&p).await.is_ok() {
                return p;
            }
        }
        requested.to_path_buf()
    }
}

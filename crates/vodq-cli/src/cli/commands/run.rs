//! `vodq run` – own the queue, serve the control socket and download.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::broadcast::error::RecvError;
use vodq_core::config::VodqConfig;
use vodq_core::control::default_control_socket_path;
use vodq_core::orchestrator::{Orchestrator, QueueEvent};
use vodq_core::queue_db::{JobStatus, QueueDb};

use crate::cli::control_socket;

const IDLE_CHECK_MS: u64 = 500;
const PROGRESS_PRINT_MS: u64 = 1000;

pub async fn run_session(cfg: VodqConfig, watch: bool) -> Result<()> {
    let socket_path = default_control_socket_path()?;
    if control_socket::is_live(&socket_path).await {
        bail!(
            "another `vodq run` owns the queue ({}); use `vodq start` to resume it",
            socket_path.display()
        );
    }

    let db = QueueDb::open_default().await?;
    let orch = Arc::new(Orchestrator::open(cfg, db).await?);
    let mut events = orch.subscribe();
    let server = control_socket::spawn_control_server(Arc::clone(&orch), &socket_path)?;

    if !orch.start_download().await? && !watch {
        println!("No queued jobs.");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut idle_check = tokio::time::interval(Duration::from_millis(IDLE_CHECK_MS));
    let mut printer = EventPrinter::default();
    let mut stopped_by_user = false;

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    tracing::warn!("ctrl-c handler: {}", e);
                }
                println!("Interrupted; pausing the active download.");
                break;
            }
            ev = events.recv() => match ev {
                Ok(ev) => {
                    // Pause and cancel land the job in paused/pending.
                    match &ev {
                        QueueEvent::DownloadFinished {
                            status: JobStatus::Paused | JobStatus::Pending,
                            ..
                        } => stopped_by_user = true,
                        QueueEvent::DownloadStarted { .. } => stopped_by_user = false,
                        _ => {}
                    }
                    printer.print(&ev);
                }
                Err(RecvError::Lagged(n)) => tracing::debug!(skipped = n, "event printer lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = idle_check.tick() => {
                if !watch
                    && !orch.is_downloading().await
                    && (stopped_by_user || !orch.has_pending_work().await)
                {
                    break;
                }
            }
        }
    }

    orch.shutdown().await?;
    server.abort();
    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::debug!(path = %socket_path.display(), "remove control socket: {}", e);
    }

    let m = orch.get_runtime_metrics().await;
    println!(
        "Done: {} completed, {} failed, {} retried; queue {} pending, {} paused, {} error.",
        m.downloads_completed,
        m.downloads_failed,
        m.retries_scheduled,
        m.queue.pending,
        m.queue.paused,
        m.queue.error
    );
    tracing::info!(
        completed = m.downloads_completed,
        failed = m.downloads_failed,
        "run finished"
    );
    Ok(())
}

#[derive(Default)]
struct EventPrinter {
    last_progress: Option<std::time::Instant>,
}

impl EventPrinter {
    fn print(&mut self, ev: &QueueEvent) {
        match ev {
            QueueEvent::DownloadStarted { job_id, title } => {
                self.last_progress = None;
                println!("[{job_id}] started: {title}");
            }
            QueueEvent::DownloadProgress { job_id, progress } => {
                let due = self
                    .last_progress
                    .map_or(true, |t| t.elapsed() >= Duration::from_millis(PROGRESS_PRINT_MS));
                if due {
                    self.last_progress = Some(std::time::Instant::now());
                    println!(
                        "[{job_id}] {:5.1}%  {}  ETA {}",
                        progress.progress_percent,
                        progress.speed.as_deref().unwrap_or("-"),
                        progress.eta.as_deref().unwrap_or("?")
                    );
                }
            }
            QueueEvent::DownloadFinished {
                job_id,
                status,
                error,
            } => match error {
                Some(err) => println!("[{job_id}] {}: {err}", status.as_str()),
                None => println!("[{job_id}] {}", status.as_str()),
            },
            QueueEvent::QueueUpdated { .. } => {}
        }
    }
}

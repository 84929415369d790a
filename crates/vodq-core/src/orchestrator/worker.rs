//! Launch, supervise and write back one download.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::error::QueueResult;
use crate::naming;
use crate::queue_db::{unix_millis, JobId, JobProgress, JobStatus};
use crate::retry::{ErrorClass, Failure, RetryManager, RetryOutcome};
use crate::runner::{self, DownloadRequest, ProgressSample, RunOutcome, StopKind};
use crate::scheduler::{choose_next, Tuning};

use super::{ActiveRun, Inner, QueueEvent, State};

const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// One download run, yielding its outcome without writing it back.
pub(super) type WorkerFuture = Pin<Box<dyn Future<Output = RunOutcome> + Send>>;

impl Inner {
    /// Promote due retries and launch the next eligible job if nothing runs.
    /// Returns whether a job is downloading afterwards.
    pub(super) async fn schedule_next(self: &Arc<Self>, state: &mut State) -> bool {
        if state.active.is_some() {
            return true;
        }

        let now = unix_millis();
        let due: Vec<JobId> = state
            .store
            .jobs()
            .iter()
            .filter(|j| RetryManager::is_due(j, now))
            .map(|j| j.id)
            .collect();
        for id in due {
            match state.store.update(id, RetryManager::promote).await {
                Ok(job) => tracing::debug!(job_id = id, attempt = job.attempt, "retry is due"),
                Err(e) => tracing::warn!(job_id = id, "promote retry: {}", e),
            }
        }

        let Some(id) = choose_next(state.store.jobs(), &state.retry, self.config.smart_scheduler)
        else {
            return false;
        };
        match self.launch(state, id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(job_id = id, "failed to start job: {}", e);
                false
            }
        }
    }

    async fn launch(self: &Arc<Self>, state: &mut State, id: JobId) -> QueueResult<()> {
        let job = state
            .store
            .update(id, |j| {
                if j.status != JobStatus::Paused {
                    j.progress = JobProgress::default();
                }
                j.status = JobStatus::Downloading;
                j.last_error = None;
                j.retry_at_ms = None;
            })
            .await?;

        let req = DownloadRequest {
            job_id: id,
            url: job.url.clone(),
            output_path: naming::output_path(&self.config, &job),
            clip: job.custom_clip.clone(),
            tuning: Tuning::for_mode(self.config.performance_mode, &self.config.downloader),
        };
        tracing::info!(
            job_id = id,
            attempt = job.attempt,
            output = %req.output_path.display(),
            "download starting"
        );

        let (stop_tx, stop_rx) = watch::channel(None);
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let now = Instant::now();
        state.active = Some(ActiveRun {
            job_id: id,
            title: job.title.clone(),
            stop_tx,
            handle: None,
            started: now,
            stop: None,
            last_flush: now,
        });
        self.metrics.record_started();
        self.emit(QueueEvent::DownloadStarted {
            job_id: id,
            title: job.title.clone(),
        });
        self.publish_queue(state);

        let work = run_worker(Arc::clone(self), req, stop_rx, progress_tx, progress_rx);
        let handle = tokio::spawn(supervise(Arc::clone(self), id, work));
        if let Some(active) = state.active.as_mut() {
            active.handle = Some(handle);
        }
        Ok(())
    }

    /// Apply progress from the runner to the active job. The flush window only
    /// restarts after a durable write actually happened.
    pub(super) async fn apply_progress(&self, job_id: JobId, sample: &ProgressSample) {
        let mut state = self.state.lock().await;
        let flush_every = Duration::from_millis(self.config.progress_flush_ms);
        let flush = match state.active.as_ref() {
            Some(active) if active.job_id == job_id => active.last_flush.elapsed() >= flush_every,
            _ => return,
        };
        let Some(mut progress) = state.store.get(job_id).map(|j| j.progress.clone()) else {
            return;
        };
        if !runner::merge(&mut progress, sample) {
            return;
        }
        if let Some(bps) = sample.speed.as_deref().and_then(runner::speed_bytes_per_sec) {
            self.metrics.set_current_throughput(bps);
        }
        match state.store.set_progress(job_id, progress.clone(), flush).await {
            Ok(_) if flush => {
                if let Some(active) = state.active.as_mut() {
                    active.last_flush = Instant::now();
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(job_id, "durable progress update failed: {}", e),
        }
        self.emit(QueueEvent::DownloadProgress { job_id, progress });
    }

    /// Write the run's outcome back to the job, then advance the session.
    async fn finish(self: &Arc<Self>, job_id: JobId, outcome: RunOutcome) {
        let mut state = self.state.lock().await;
        let requested = match state.active.take() {
            Some(active) if active.job_id == job_id => {
                self.metrics.record_busy(active.started.elapsed());
                active.stop
            }
            other => {
                // Released elsewhere after a crash; nothing to write back.
                state.active = other;
                return;
            }
        };
        self.metrics.set_current_throughput(0.0);

        // A user stop wins over whatever the process did on its way out,
        // unless it actually produced a valid file.
        let outcome = match (requested, outcome) {
            (_, done @ RunOutcome::Completed { .. }) => done,
            (Some(kind), _) => RunOutcome::Stopped(kind),
            (None, other) => other,
        };

        let State { store, retry, .. } = &mut *state;
        let written = match outcome {
            RunOutcome::Completed { output, bytes } => {
                self.metrics.record_completed(bytes);
                retry.forget(job_id);
                store
                    .update(job_id, |j| {
                        j.status = JobStatus::Completed;
                        j.progress.progress_percent = 100.0;
                        j.progress.downloaded_bytes = j.progress.downloaded_bytes.max(bytes);
                        j.progress.total_bytes = j.progress.total_bytes.max(bytes);
                        j.progress.eta = None;
                        j.last_error = None;
                        j.error_class = None;
                        j.retry_at_ms = None;
                        j.retry_exhausted = false;
                        j.output_path = Some(output.to_string_lossy().into_owned());
                    })
                    .await
            }
            RunOutcome::Stopped(StopKind::Pause) => {
                store.update(job_id, |j| j.status = JobStatus::Paused).await
            }
            RunOutcome::Stopped(StopKind::Cancel) => {
                store
                    .update(job_id, |j| {
                        j.status = JobStatus::Pending;
                        j.progress = JobProgress::default();
                        j.output_path = None;
                    })
                    .await
            }
            RunOutcome::Failed(failure) => {
                self.metrics.record_failed(failure.class);
                let now = unix_millis();
                let mut decision = None;
                let res = store
                    .update(job_id, |j| {
                        j.progress.speed = None;
                        j.progress.eta = None;
                        decision = Some(retry.on_failure(j, &failure, now));
                    })
                    .await;
                match decision {
                    Some(RetryOutcome::Scheduled { delay, .. }) => {
                        self.metrics.record_retry_scheduled(delay);
                        tracing::info!(
                            job_id,
                            class = failure.class.as_str(),
                            delay_ms = delay.as_millis() as u64,
                            "retry scheduled"
                        );
                    }
                    Some(RetryOutcome::Exhausted) => {
                        self.metrics.record_retry_exhausted();
                        tracing::warn!(job_id, "retries exhausted: {}", failure.message);
                    }
                    Some(RetryOutcome::Terminal) => {
                        tracing::warn!(
                            job_id,
                            class = failure.class.as_str(),
                            "download failed: {}",
                            failure.message
                        );
                    }
                    None => {}
                }
                res
            }
        };

        match written {
            Ok(job) => {
                tracing::info!(job_id, status = job.status.as_str(), "download finished");
                self.emit(QueueEvent::DownloadFinished {
                    job_id,
                    status: job.status,
                    error: job.last_error.clone(),
                });
            }
            Err(e) => tracing::error!(job_id, "write back download result: {}", e),
        }
        self.publish_queue(&state);

        if state.session_running {
            self.schedule_next(&mut state).await;
        }
    }
}

/// Run `work` on its own task and write back whatever it yields. A worker that
/// panics is recorded as a tool crash so the job and the session move on.
// Boxed with a named type: the future contains `finish`, which can launch the
// next worker, so an opaque `async fn` type here would be cyclic.
pub(super) fn supervise(
    inner: Arc<Inner>,
    job_id: JobId,
    work: WorkerFuture,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let outcome = match tokio::spawn(work).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = worker_died(e);
                tracing::error!(job_id, "{}", message);
                RunOutcome::Failed(Failure::new(ErrorClass::ToolCrash, message))
            }
        };
        inner.finish(job_id, outcome).await;
    })
}

fn worker_died(e: JoinError) -> String {
    if !e.is_panic() {
        return format!("download worker stopped: {}", e);
    }
    let payload = e.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("download worker panicked: {}", detail)
}

fn run_worker(
    inner: Arc<Inner>,
    req: DownloadRequest,
    stop_rx: watch::Receiver<Option<StopKind>>,
    progress_tx: mpsc::Sender<ProgressSample>,
    mut progress_rx: mpsc::Receiver<ProgressSample>,
) -> WorkerFuture {
    Box::pin(async move {
        let job_id = req.job_id;
        let run = runner::run_download(&inner.config.downloader, &req, stop_rx, progress_tx);
        let pump = async {
            while let Some(sample) = progress_rx.recv().await {
                inner.apply_progress(job_id, &sample).await;
            }
        };
        let (outcome, ()) = tokio::join!(run, pump);
        outcome
    })
}

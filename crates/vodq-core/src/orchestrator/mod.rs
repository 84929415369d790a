//! The single owner of queue, runner, retry and metrics state.
//!
//! Every command takes the command lock for its whole duration, so a pause or
//! cancel returns only after the download process has exited and the job has
//! been written back. Short state mutations happen under the state lock; the
//! download itself runs on a spawned task that reports back through the same
//! lock. A ticker re-runs scheduling every `scheduler_tick_ms` so armed
//! retries start without any caller polling.

mod events;
mod worker;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::VodqConfig;
use crate::error::{QueueError, QueueResult};
use crate::metadata_cache::MetadataCache;
use crate::metrics::{ActiveJob, Metrics, RuntimeMetrics};
use crate::queue_db::{AddOutcome, Candidate, Job, JobId, JobStatus, QueueDb, QueueStore};
use crate::retry::{RetryManager, RetryPolicy};
use crate::runner::StopKind;

pub use events::QueueEvent;

const EVENT_CAPACITY: usize = 256;

pub(crate) struct Inner {
    config: VodqConfig,
    state: Mutex<State>,
    commands: Mutex<()>,
    events: broadcast::Sender<QueueEvent>,
    metrics: Metrics,
    cache: MetadataCache,
}

struct State {
    store: QueueStore,
    retry: RetryManager,
    active: Option<ActiveRun>,
    /// Set by start/retry, cleared by pause/cancel. While set, finished jobs
    /// and ticks advance to the next eligible job.
    session_running: bool,
}

/// The one job whose process is running.
struct ActiveRun {
    job_id: JobId,
    title: String,
    stop_tx: watch::Sender<Option<StopKind>>,
    handle: Option<JoinHandle<()>>,
    started: Instant,
    stop: Option<StopKind>,
    last_flush: Instant,
}

pub struct Orchestrator {
    inner: Arc<Inner>,
    ticker: JoinHandle<()>,
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

impl Orchestrator {
    /// Load the queue from `db` and start the scheduling timer.
    /// Must be called from within a tokio runtime.
    pub async fn open(config: VodqConfig, db: QueueDb) -> anyhow::Result<Self> {
        config.validate()?;
        let store = QueueStore::load(db).await?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                store,
                retry: RetryManager::new(RetryPolicy::from(&config.retry)),
                active: None,
                session_running: false,
            }),
            commands: Mutex::new(()),
            events,
            metrics: Metrics::new(),
            cache: MetadataCache::new(config.metadata_cache_minutes),
            config,
        });
        let period = Duration::from_millis(inner.config.scheduler_tick_ms.max(1));
        let ticker = spawn_ticker(Arc::downgrade(&inner), period);
        Ok(Self { inner, ticker })
    }

    pub fn config(&self) -> &VodqConfig {
        &self.inner.config
    }

    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.inner.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    pub async fn get_queue(&self) -> Vec<Job> {
        self.inner.state.lock().await.store.list()
    }

    /// Append a candidate (or ignore it as a duplicate) and return the queue.
    pub async fn add_to_queue(&self, candidate: Candidate) -> QueueResult<Vec<Job>> {
        let _cmd = self.inner.commands.lock().await;
        let mut state = self.inner.state.lock().await;
        let cfg = &self.inner.config;
        let dedup = cfg
            .prevent_duplicate_downloads
            .then_some(cfg.duplicate_key);
        let outcome = state.store.add(&candidate, dedup).await?;
        if let AddOutcome::Added(_) = outcome {
            if state.session_running {
                self.inner.schedule_next(&mut state).await;
            }
        }
        Ok(self.inner.publish_queue(&state))
    }

    pub async fn remove_from_queue(&self, id: JobId) -> QueueResult<Vec<Job>> {
        let _cmd = self.inner.commands.lock().await;
        let mut state = self.inner.state.lock().await;
        let active = state.active.as_ref().map(|a| a.job_id);
        state.store.remove(id, active).await?;
        state.retry.forget(id);
        Ok(self.inner.publish_queue(&state))
    }

    pub async fn reorder_queue(&self, ordered_ids: &[JobId]) -> QueueResult<Vec<Job>> {
        let _cmd = self.inner.commands.lock().await;
        let mut state = self.inner.state.lock().await;
        state.store.reorder(ordered_ids).await?;
        Ok(self.inner.publish_queue(&state))
    }

    pub async fn clear_completed(&self) -> QueueResult<Vec<Job>> {
        let _cmd = self.inner.commands.lock().await;
        let mut state = self.inner.state.lock().await;
        let removed = state.store.clear_completed().await?;
        tracing::info!(removed, "cleared completed jobs");
        Ok(self.inner.publish_queue(&state))
    }

    /// Begin processing the queue. Returns whether a job is now downloading.
    pub async fn start_download(&self) -> QueueResult<bool> {
        let _cmd = self.inner.commands.lock().await;
        let mut state = self.inner.state.lock().await;
        state.session_running = true;
        Ok(self.inner.schedule_next(&mut state).await)
    }

    /// Pause the active job, keeping its partial output. Returns false when
    /// nothing was downloading.
    pub async fn pause_download(&self) -> QueueResult<bool> {
        self.stop_active(StopKind::Pause).await
    }

    /// Cancel the active job: partial output is removed and the job goes back
    /// to `pending`. Returns false when nothing was downloading.
    pub async fn cancel_download(&self) -> QueueResult<bool> {
        self.stop_active(StopKind::Cancel).await
    }

    pub async fn is_downloading(&self) -> bool {
        self.inner.state.lock().await.active.is_some()
    }

    /// Re-queue every failed job with a fresh attempt budget, then start.
    pub async fn retry_failed_downloads(&self) -> QueueResult<Vec<Job>> {
        let _cmd = self.inner.commands.lock().await;
        let mut state = self.inner.state.lock().await;
        self.rearm_failed(&mut state).await?;
        state.session_running = true;
        self.inner.schedule_next(&mut state).await;
        Ok(self.inner.publish_queue(&state))
    }

    /// Re-queue every failed job with a fresh attempt budget without starting
    /// a session.
    pub async fn requeue_failed(&self) -> QueueResult<Vec<Job>> {
        let _cmd = self.inner.commands.lock().await;
        let mut state = self.inner.state.lock().await;
        self.rearm_failed(&mut state).await?;
        Ok(self.inner.publish_queue(&state))
    }

    async fn rearm_failed(&self, state: &mut State) -> QueueResult<()> {
        let failed: Vec<JobId> = state
            .store
            .jobs()
            .iter()
            .filter(|j| j.status == JobStatus::Error)
            .map(|j| j.id)
            .collect();
        for id in &failed {
            state.store.update(*id, RetryManager::rearm).await?;
            state.retry.forget(*id);
        }
        tracing::info!(count = failed.len(), "re-queued failed jobs");
        Ok(())
    }

    pub async fn get_runtime_metrics(&self) -> RuntimeMetrics {
        let state = self.inner.state.lock().await;
        let active = state.active.as_ref().map(|a| ActiveJob {
            id: a.job_id,
            title: a.title.clone(),
        });
        self.inner
            .metrics
            .snapshot(state.store.jobs(), self.inner.cache.stats(), active)
    }

    /// True while a job runs or one could still run without user action:
    /// pending/paused jobs, or failed jobs with an armed retry.
    pub async fn has_pending_work(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.active.is_some()
            || state.store.jobs().iter().any(|j| match j.status {
                JobStatus::Pending | JobStatus::Paused => true,
                JobStatus::Error => j.retry_at_ms.is_some() && !j.retry_exhausted,
                _ => false,
            })
    }

    /// Pause whatever is running so it resumes on the next start.
    pub async fn shutdown(&self) -> QueueResult<()> {
        self.pause_download().await?;
        self.ticker.abort();
        Ok(())
    }

    async fn stop_active(&self, kind: StopKind) -> QueueResult<bool> {
        let _cmd = self.inner.commands.lock().await;
        let (job_id, handle) = {
            let mut state = self.inner.state.lock().await;
            state.session_running = false;
            let Some(active) = state.active.as_mut() else {
                return Ok(false);
            };
            active.stop = Some(kind);
            // The receiver is gone only if the run already ended.
            let _ = active.stop_tx.send(Some(kind));
            (active.job_id, active.handle.take())
        };
        tracing::info!(job_id, ?kind, "stop requested");

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(job_id, "download task failed: {}", e);
                self.inner.release_crashed(job_id, kind).await?;
            }
        }
        Ok(true)
    }
}

impl Inner {
    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_queue(&self, state: &State) -> Vec<Job> {
        let jobs = state.store.list();
        self.emit(QueueEvent::QueueUpdated { jobs: jobs.clone() });
        jobs
    }

    async fn tick(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.session_running && state.active.is_none() {
            self.schedule_next(&mut state).await;
        }
    }

    /// Worker task died without writing back; put the job in a resumable state.
    async fn release_crashed(&self, job_id: JobId, kind: StopKind) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if state.active.as_ref().map(|a| a.job_id) != Some(job_id) {
            return Ok(());
        }
        state.active = None;
        let status = match kind {
            StopKind::Pause => JobStatus::Paused,
            StopKind::Cancel => JobStatus::Pending,
        };
        match state.store.update(job_id, |j| j.status = status).await {
            Ok(_) | Err(QueueError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.publish_queue(&state);
        Ok(())
    }
}

fn spawn_ticker(inner: Weak<Inner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.tick().await;
        }
    })
}

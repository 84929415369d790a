//! Integration tests: drive the orchestrator against a scripted downloader.
//!
//! Each test builds an orchestrator on an in-memory or temp-dir database and
//! a `sh -c` script standing in for yt-dlp, then checks job state, files on
//! disk and metrics after the run.

#![cfg(unix)]

mod common;

use common::{candidate, fake_tool, finished_with, next_finished, wait_for};
use tempfile::tempdir;
use vodq_core::orchestrator::{Orchestrator, QueueEvent};
use vodq_core::queue_db::{JobStatus, QueueDb};
use vodq_core::retry::ErrorClass;

async fn open(cfg: vodq_core::config::VodqConfig) -> Orchestrator {
    Orchestrator::open(cfg, QueueDb::open_memory().await.unwrap())
        .await
        .expect("open orchestrator")
}

#[tokio::test]
async fn successful_download_completes_and_writes_file() {
    let dl = tempdir().unwrap();
    let orch = open(fake_tool::config(dl.path(), fake_tool::SUCCESS)).await;
    let mut events = orch.subscribe();

    let q = orch
        .add_to_queue(candidate("https://www.twitch.tv/videos/100", "first vod"))
        .await
        .unwrap();
    let id = q[0].id;
    assert!(orch.start_download().await.unwrap());
    finished_with(&mut events, id, JobStatus::Completed).await;

    let job = orch.get_queue().await.remove(0);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.progress_percent, 100.0);
    assert_eq!(job.progress.total_bytes, 1024);
    assert!(job.last_error.is_none());
    let output = job.output_path.expect("output path recorded");
    assert_eq!(std::fs::metadata(&output).unwrap().len(), 1024);
    assert!(output.ends_with(&format!("{}_first_vod.mp4", id)));

    let m = orch.get_runtime_metrics().await;
    assert_eq!(m.downloads_started, 1);
    assert_eq!(m.downloads_completed, 1);
    assert_eq!(m.total_bytes, 1024);
    assert_eq!(m.queue.completed, 1);
    assert!(m.active_job.is_none());
}

#[tokio::test]
async fn jobs_run_one_at_a_time_in_queue_order() {
    let dl = tempdir().unwrap();
    let orch = open(fake_tool::config(dl.path(), fake_tool::SUCCESS)).await;
    let mut events = orch.subscribe();

    for i in 0..3 {
        orch.add_to_queue(candidate(&format!("https://www.twitch.tv/videos/{i}"), &format!("vod {i}")))
            .await
            .unwrap();
    }
    let mut order: Vec<_> = orch.get_queue().await.iter().map(|j| j.id).collect();
    order.rotate_left(1);
    orch.reorder_queue(&order).await.unwrap();

    orch.start_download().await.unwrap();
    let mut started = Vec::new();
    let mut finished = 0;
    while finished < 3 {
        let ev = wait_for(&mut events, |ev| match ev {
            QueueEvent::DownloadStarted { .. } | QueueEvent::DownloadFinished { .. } => {
                Some(ev.clone())
            }
            _ => None,
        })
        .await;
        match ev {
            QueueEvent::DownloadStarted { job_id, .. } => {
                // A new start only ever follows the previous finish.
                assert_eq!(started.len(), finished);
                started.push(job_id);
            }
            QueueEvent::DownloadFinished { status, .. } => {
                assert_eq!(status, JobStatus::Completed);
                finished += 1;
            }
            _ => unreachable!(),
        }
    }
    assert_eq!(started, order);

    let q = orch.get_queue().await;
    assert!(q.iter().all(|j| j.status == JobStatus::Completed));
    let q = orch.clear_completed().await.unwrap();
    assert!(q.is_empty());
}

#[tokio::test]
async fn pause_keeps_progress_and_start_resumes() {
    let dl = tempdir().unwrap();
    let orch = open(fake_tool::config(dl.path(), fake_tool::SLOW)).await;
    let mut events = orch.subscribe();

    let id = orch
        .add_to_queue(candidate("https://www.twitch.tv/videos/7", "long vod"))
        .await
        .unwrap()[0]
        .id;
    assert!(orch.start_download().await.unwrap());
    wait_for(&mut events, |ev| match ev {
        QueueEvent::DownloadProgress { job_id, .. } if *job_id == id => Some(()),
        _ => None,
    })
    .await;

    assert!(orch.pause_download().await.unwrap());
    assert!(!orch.is_downloading().await);
    let job = orch.get_queue().await.remove(0);
    assert_eq!(job.status, JobStatus::Paused);
    assert_eq!(job.progress.progress_percent, 10.0);
    assert_eq!(job.progress.total_parts, 10);

    assert!(orch.start_download().await.unwrap());
    assert!(orch.is_downloading().await);
    let job = orch.get_queue().await.remove(0);
    assert_eq!(job.status, JobStatus::Downloading);
    assert_eq!(job.progress.progress_percent, 10.0);

    assert!(orch.cancel_download().await.unwrap());
    let job = orch.get_queue().await.remove(0);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress.progress_percent, 0.0);
    assert!(job.last_error.is_none());
    let leftovers: Vec<_> = std::fs::read_dir(dl.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "partial output removed on cancel");

    // Cancel halts the session: nothing restarts on its own.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!orch.is_downloading().await);
}

#[tokio::test]
async fn remove_refuses_the_active_job() {
    let dl = tempdir().unwrap();
    let orch = open(fake_tool::config(dl.path(), fake_tool::SLOW)).await;

    let id = orch
        .add_to_queue(candidate("https://www.twitch.tv/videos/8", "busy"))
        .await
        .unwrap()[0]
        .id;
    orch.start_download().await.unwrap();
    assert!(orch.remove_from_queue(id).await.is_err());
    let m = orch.get_runtime_metrics().await;
    assert_eq!(m.active_job.map(|a| a.id), Some(id));
    assert_eq!(m.queue.downloading, 1);

    orch.cancel_download().await.unwrap();
    assert!(orch.remove_from_queue(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn silent_tool_times_out() {
    let dl = tempdir().unwrap();
    let mut cfg = fake_tool::config(dl.path(), fake_tool::SILENT);
    cfg.downloader.first_output_timeout_secs = 1;
    cfg.retry.max_attempts = 1;
    let orch = open(cfg).await;
    let mut events = orch.subscribe();

    orch.add_to_queue(candidate("https://www.twitch.tv/videos/9", "silent"))
        .await
        .unwrap();
    orch.start_download().await.unwrap();
    let (_, status, error) = next_finished(&mut events).await;
    assert_eq!(status, JobStatus::Error);
    assert!(error.unwrap().contains("no output"));

    let job = orch.get_queue().await.remove(0);
    assert_eq!(job.error_class, Some(ErrorClass::Timeout));
    assert!(job.retry_exhausted);
    let m = orch.get_runtime_metrics().await;
    assert_eq!(m.retries_exhausted, 1);
    assert_eq!(m.last_error_class, Some(ErrorClass::Timeout));
}

#[tokio::test]
async fn transient_failure_is_retried_with_backoff() {
    let dl = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let script = fake_tool::flaky(&scratch.path().join("failed-once"));
    let orch = open(fake_tool::config(dl.path(), &script)).await;
    let mut events = orch.subscribe();

    let id = orch
        .add_to_queue(candidate("https://www.twitch.tv/videos/10", "flaky"))
        .await
        .unwrap()[0]
        .id;
    orch.start_download().await.unwrap();

    let (_, status, error) = next_finished(&mut events).await;
    assert_eq!(status, JobStatus::Error);
    assert!(error.unwrap().contains("503"));
    finished_with(&mut events, id, JobStatus::Completed).await;

    let job = orch.get_queue().await.remove(0);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempt, 2);
    assert!(job.error_class.is_none());

    let m = orch.get_runtime_metrics().await;
    assert_eq!(m.retries_scheduled, 1);
    assert_eq!(m.retries_exhausted, 0);
    assert_eq!(m.downloads_failed, 1);
    assert_eq!(m.downloads_completed, 1);
    assert_eq!(m.last_error_class, Some(ErrorClass::Network));
    assert!(m.last_retry_delay_seconds.is_some_and(|s| s > 0.0 && s <= 1.0));
}

#[tokio::test]
async fn missing_output_is_an_integrity_failure() {
    let dl = tempdir().unwrap();
    let mut cfg = fake_tool::config(dl.path(), fake_tool::NO_FILE);
    cfg.retry.max_attempts = 1;
    let orch = open(cfg).await;
    let mut events = orch.subscribe();

    orch.add_to_queue(candidate("https://www.twitch.tv/videos/11", "ghost"))
        .await
        .unwrap();
    orch.start_download().await.unwrap();
    let (_, status, _) = next_finished(&mut events).await;
    assert_eq!(status, JobStatus::Error);

    let job = orch.get_queue().await.remove(0);
    assert_eq!(job.error_class, Some(ErrorClass::Integrity));
    let m = orch.get_runtime_metrics().await;
    assert_eq!(m.integrity_failures, 1);
}

#[tokio::test]
async fn retry_failed_downloads_requeues_terminal_failures() {
    let dl = tempdir().unwrap();
    let orch = open(fake_tool::config(dl.path(), fake_tool::NOT_FOUND)).await;
    let mut events = orch.subscribe();

    for i in 0..2 {
        orch.add_to_queue(candidate(&format!("https://www.twitch.tv/videos/2{i}"), &format!("gone {i}")))
            .await
            .unwrap();
    }
    orch.start_download().await.unwrap();
    next_finished(&mut events).await;
    next_finished(&mut events).await;
    let q = orch.get_queue().await;
    assert!(q.iter().all(|j| j.status == JobStatus::Error));
    assert!(q.iter().all(|j| j.error_class == Some(ErrorClass::NotFound)));
    assert!(q.iter().all(|j| j.retry_at_ms.is_none()));
    assert!(!orch.has_pending_work().await);

    let before = q;
    let after = orch.retry_failed_downloads().await.unwrap();
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.id, new.id);
        assert!(matches!(
            new.status,
            JobStatus::Pending | JobStatus::Downloading
        ));
        assert_eq!(new.attempt, 1);
        assert!(!new.retry_exhausted);
    }
    assert_eq!(
        after
            .iter()
            .filter(|j| j.status == JobStatus::Downloading)
            .count(),
        1
    );
}

#[tokio::test]
async fn queue_survives_restart_and_interrupted_job_resumes_paused() {
    let dl = tempdir().unwrap();
    let state = tempdir().unwrap();
    let db_path = state.path().join("queue.db");

    let ids = {
        let orch = Orchestrator::open(
            fake_tool::config(dl.path(), fake_tool::SUCCESS),
            QueueDb::open_at(&db_path).await.unwrap(),
        )
        .await
        .unwrap();
        for i in 0..3 {
            orch.add_to_queue(candidate(&format!("https://www.twitch.tv/videos/3{i}"), &format!("kept {i}")))
                .await
                .unwrap();
        }
        let mut ids: Vec<_> = orch.get_queue().await.iter().map(|j| j.id).collect();
        ids.reverse();
        orch.reorder_queue(&ids).await.unwrap();
        ids
    };

    // Simulate a crash mid-download.
    {
        let db = QueueDb::open_at(&db_path).await.unwrap();
        let mut job = db.get_job(ids[1]).await.unwrap().unwrap();
        job.status = JobStatus::Downloading;
        db.update_job(&job).await.unwrap();
    }

    let orch = Orchestrator::open(
        fake_tool::config(dl.path(), fake_tool::SUCCESS),
        QueueDb::open_at(&db_path).await.unwrap(),
    )
    .await
    .unwrap();
    let q = orch.get_queue().await;
    assert_eq!(q.iter().map(|j| j.id).collect::<Vec<_>>(), ids);
    assert_eq!(q[1].status, JobStatus::Paused);
    assert!(!orch.is_downloading().await);
    assert!(orch.has_pending_work().await);
}

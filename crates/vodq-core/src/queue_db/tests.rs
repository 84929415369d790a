//! Tests for queue_db (in-memory and on-disk databases).

use crate::config::DuplicateKey;
use crate::error::QueueError;
use crate::queue_db::{
    AddOutcome, Candidate, CustomClip, JobProgress, JobStatus, QueueDb, QueueStore,
};
use crate::retry::ErrorClass;

fn candidate(url: &str, title: &str) -> Candidate {
    Candidate {
        url: url.to_string(),
        title: title.to_string(),
        date: "2024-05-01".to_string(),
        streamer: "somestreamer".to_string(),
        duration_label: "1h02m".to_string(),
        custom_clip: None,
    }
}

fn clip(start: f64, duration: f64) -> CustomClip {
    CustomClip {
        start_sec: start,
        duration_sec: duration,
        start_part: 0,
        filename_format: "simple".to_string(),
        filename_template: None,
    }
}

async fn memory_store() -> QueueStore {
    QueueStore::load(QueueDb::open_memory().await.unwrap())
        .await
        .unwrap()
}

fn ids(store: &QueueStore) -> Vec<i64> {
    store.jobs().iter().map(|j| j.id).collect()
}

#[tokio::test]
async fn insert_and_list_keep_queue_order() {
    let db = QueueDb::open_memory().await.unwrap();
    let a = db.insert_job(&candidate("https://v/1", "one")).await.unwrap();
    let b = db.insert_job(&candidate("https://v/2", "two")).await.unwrap();
    let c = db.insert_job(&candidate("https://v/3", "three")).await.unwrap();

    let jobs = db.list_jobs().await.unwrap();
    assert_eq!(
        jobs.iter().map(|j| j.id).collect::<Vec<_>>(),
        vec![a.id, b.id, c.id]
    );
    assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
    assert_eq!(jobs[0].attempt, 1);
    assert_eq!(jobs[1].title, "two");
    assert_eq!(jobs[2].duration_label, "1h02m");
}

#[tokio::test]
async fn update_job_persists_mutable_fields() {
    let db = QueueDb::open_memory().await.unwrap();
    let mut job = db
        .insert_job(&Candidate {
            custom_clip: Some(clip(30.0, 15.5)),
            ..candidate("https://v/clip", "clip")
        })
        .await
        .unwrap();

    job.status = JobStatus::Error;
    job.last_error = Some("connection reset".to_string());
    job.attempt = 2;
    job.retry_at_ms = Some(1_700_000_000_000);
    job.error_class = Some(ErrorClass::Network);
    job.progress = JobProgress {
        progress_percent: 42.5,
        speed: Some("1.20MiB/s".to_string()),
        eta: Some("00:31".to_string()),
        current_part: 3,
        total_parts: 40,
        downloaded_bytes: 1_000,
        total_bytes: 4_000,
    };
    db.update_job(&job).await.unwrap();

    let loaded = db.get_job(job.id).await.unwrap().expect("job exists");
    assert_eq!(loaded, job);
    assert_eq!(loaded.custom_clip, Some(clip(30.0, 15.5)));
}

#[tokio::test]
async fn recover_downloading_jobs_resets_to_paused() {
    let db = QueueDb::open_memory().await.unwrap();
    let mut job = db.insert_job(&candidate("https://v/x", "x")).await.unwrap();
    job.status = JobStatus::Downloading;
    db.update_job(&job).await.unwrap();

    let n = db.recover_downloading_jobs().await.unwrap();
    assert_eq!(n, 1);
    assert_eq!(db.list_jobs().await.unwrap()[0].status, JobStatus::Paused);
}

#[tokio::test]
async fn unknown_stored_status_loads_as_error_with_reason() {
    let db = QueueDb::open_memory().await.unwrap();
    let job = db.insert_job(&candidate("https://v/x", "x")).await.unwrap();
    sqlx::query("UPDATE jobs SET status = 'archived' WHERE id = ?1")
        .bind(job.id)
        .execute(&db.pool)
        .await
        .unwrap();

    let loaded = db.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Error);
    let reason = loaded.last_error.unwrap_or_default();
    assert!(reason.contains("archived"), "{reason}");

    assert_eq!("archived".parse::<JobStatus>().unwrap_err().value, "archived");
    assert_eq!("paused".parse::<JobStatus>(), Ok(JobStatus::Paused));
}

#[tokio::test]
async fn reorder_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("queue.db");
    let order = {
        let db = QueueDb::open_at(&path).await.unwrap();
        let mut store = QueueStore::load(db).await.unwrap();
        for i in 0..4 {
            store
                .add(&candidate(&format!("https://v/{i}"), &format!("t{i}")), None)
                .await
                .unwrap();
        }
        let mut order = ids(&store);
        order.reverse();
        order.swap(0, 2);
        store.reorder(&order).await.unwrap();
        assert_eq!(ids(&store), order);
        order
    };

    let reopened = QueueStore::load(QueueDb::open_at(&path).await.unwrap())
        .await
        .unwrap();
    assert_eq!(ids(&reopened), order);
}

#[tokio::test]
async fn reorder_rejects_non_permutations() {
    let mut store = memory_store().await;
    for i in 0..3 {
        store
            .add(&candidate(&format!("https://v/{i}"), "t"), None)
            .await
            .unwrap();
    }
    let original = ids(&store);

    let missing = vec![original[0], original[1]];
    let duplicated = vec![original[0], original[0], original[1]];
    let foreign = vec![original[0], original[1], 9999];
    for bad in [missing, duplicated, foreign] {
        let err = store.reorder(&bad).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument(_)));
        assert_eq!(ids(&store), original);
    }
}

#[tokio::test]
async fn dedup_ignores_matching_non_error_jobs() {
    let mut store = memory_store().await;
    let first = store
        .add(&candidate("https://v/1", "same"), Some(DuplicateKey::UrlTitle))
        .await
        .unwrap();
    let AddOutcome::Added(first_id) = first else {
        panic!("first add must insert");
    };
    let second = store
        .add(&candidate("https://v/1", "same"), Some(DuplicateKey::UrlTitle))
        .await
        .unwrap();
    assert_eq!(second, AddOutcome::Duplicate(first_id));
    assert_eq!(store.jobs().len(), 1);

    // Dedup disabled: always appends.
    store
        .add(&candidate("https://v/1", "same"), None)
        .await
        .unwrap();
    assert_eq!(store.jobs().len(), 2);
}

#[tokio::test]
async fn dedup_allows_requeue_of_failed_job() {
    let mut store = memory_store().await;
    let AddOutcome::Added(id) = store
        .add(&candidate("https://v/1", "same"), Some(DuplicateKey::UrlTitle))
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };
    store
        .update(id, |j| {
            j.status = JobStatus::Error;
            j.last_error = Some("boom".into());
        })
        .await
        .unwrap();

    let again = store
        .add(&candidate("https://v/1", "same"), Some(DuplicateKey::UrlTitle))
        .await
        .unwrap();
    assert!(matches!(again, AddOutcome::Added(new_id) if new_id != id));
    assert_eq!(store.jobs().len(), 2);
}

#[tokio::test]
async fn dedup_by_streamer_and_range_distinguishes_clips() {
    let mut store = memory_store().await;
    let key = Some(DuplicateKey::UrlStreamerRange);
    let base = candidate("https://v/vod", "clip a");
    store
        .add(
            &Candidate {
                custom_clip: Some(clip(10.0, 20.0)),
                ..base.clone()
            },
            key,
        )
        .await
        .unwrap();

    // Different title, same range: duplicate under this key.
    let same_range = store
        .add(
            &Candidate {
                title: "clip b".into(),
                custom_clip: Some(clip(10.0, 20.0)),
                ..base.clone()
            },
            key,
        )
        .await
        .unwrap();
    assert!(matches!(same_range, AddOutcome::Duplicate(_)));

    let other_range = store
        .add(
            &Candidate {
                custom_clip: Some(clip(40.0, 20.0)),
                ..base.clone()
            },
            key,
        )
        .await
        .unwrap();
    assert!(matches!(other_range, AddOutcome::Added(_)));
    assert_eq!(store.jobs().len(), 2);
}

#[tokio::test]
async fn add_rejects_malformed_candidates() {
    let mut store = memory_store().await;
    let empty_url = candidate("  ", "t");
    let empty_title = candidate("https://v/1", "");
    let zero_clip = Candidate {
        custom_clip: Some(clip(5.0, 0.0)),
        ..candidate("https://v/1", "t")
    };
    let negative_start = Candidate {
        custom_clip: Some(clip(-1.0, 10.0)),
        ..candidate("https://v/1", "t")
    };
    for bad in [empty_url, empty_title, zero_clip, negative_start] {
        let err = store.add(&bad, None).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument(_)), "{bad:?}");
    }
    assert!(store.jobs().is_empty());
}

#[tokio::test]
async fn remove_rejects_active_and_unknown_jobs() {
    let mut store = memory_store().await;
    let AddOutcome::Added(id) = store.add(&candidate("https://v/1", "t"), None).await.unwrap()
    else {
        panic!("expected insert");
    };
    assert!(matches!(
        store.remove(id, Some(id)).await,
        Err(QueueError::InvalidState(_))
    ));
    assert!(matches!(
        store.remove(4242, None).await,
        Err(QueueError::NotFound(4242))
    ));
    store.remove(id, None).await.unwrap();
    assert!(store.jobs().is_empty());
}

#[tokio::test]
async fn clear_completed_keeps_others_in_order() {
    let mut store = memory_store().await;
    for i in 0..5 {
        store
            .add(&candidate(&format!("https://v/{i}"), "t"), None)
            .await
            .unwrap();
    }
    let all = ids(&store);
    for id in [all[1], all[3]] {
        store
            .update(id, |j| j.status = JobStatus::Completed)
            .await
            .unwrap();
    }
    store
        .update(all[4], |j| j.status = JobStatus::Error)
        .await
        .unwrap();

    let removed = store.clear_completed().await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(ids(&store), vec![all[0], all[2], all[4]]);
    assert_eq!(store.get(all[4]).unwrap().status, JobStatus::Error);
}

//! Pipeline integration tests
//!
//! End-to-end cycles with file-backed state, the in-memory source, and either
//! the email notifier over the recording transport or the scripted notifier.
//! Covers the forward/retry hand-off, restarts, corruption handling and
//! concurrent use of the shared failure queue.

use offense_watch::{
    Channel, CursorStore, DrainerSettings, EmailNotifier, FailureQueueStore, FileCursorStore,
    FileFailureQueue, ForwardScanner, MemoryMailTransport, MemoryNotifier, MemorySource,
    NotifyFailure, Offense, OffenseStatus, RetryDrainer, ScannerSettings, WatchError,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const WATCHED: &str = "Malware Detected";

fn an_hour_ago() -> i64 {
    chrono::Utc::now().timestamp_millis() - 3_600_000
}

struct Pipeline {
    source: Arc<MemorySource>,
    cursor: Arc<FileCursorStore>,
    queue: Arc<FileFailureQueue>,
    scanner: ForwardScanner,
    drainer: RetryDrainer,
}

fn pipeline(dir: &Path, notifier: Arc<dyn offense_watch::Notifier>) -> Pipeline {
    let source = Arc::new(MemorySource::default());
    let cursor = Arc::new(FileCursorStore::new(dir.join("last_notified_offense")));
    let queue = Arc::new(FileFailureQueue::new(dir.join("failed_notifications")));

    let scanner = ForwardScanner::new(
        source.clone(),
        notifier.clone(),
        cursor.clone(),
        queue.clone(),
        vec![WATCHED.to_string()],
        ScannerSettings::default(),
    );
    let drainer = RetryDrainer::new(
        source.clone(),
        notifier,
        queue.clone(),
        DrainerSettings::default(),
    );

    Pipeline {
        source,
        cursor,
        queue,
        scanner,
        drainer,
    }
}

fn ids(set: BTreeSet<u64>) -> Vec<u64> {
    set.into_iter().collect()
}

// ─── Forward scanner ─────────────────────────────────────────────

#[tokio::test]
async fn test_mixed_batch_with_file_state() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("last_notified_offense"), "100").unwrap();
    let notifier = Arc::new(MemoryNotifier::default());
    let p = pipeline(dir.path(), notifier.clone());

    p.source.upsert(Offense::new(101, WATCHED, an_hour_ago())).await;
    p.source.upsert(Offense::new(102, WATCHED, an_hour_ago() + 1)).await;
    p.source.upsert(Offense::new(103, "Port Scan", an_hour_ago() + 2)).await;
    notifier.fail_for(102).await;

    let report = p.scanner.run_cycle().await.unwrap();

    assert_eq!(report.notified, vec![101]);
    assert_eq!(report.enqueued, vec![102]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("last_notified_offense")).unwrap(),
        "101"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("failed_notifications")).unwrap(),
        "102"
    );
    assert!(!notifier.attempts().await.iter().any(|(id, _, _)| *id == 103));
}

#[tokio::test]
async fn test_missing_cursor_file_blocks_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(MemoryNotifier::default());
    let p = pipeline(dir.path(), notifier.clone());
    p.source.upsert(Offense::new(1, WATCHED, an_hour_ago())).await;

    let err = p.scanner.run_cycle().await.unwrap_err();

    assert!(matches!(err, WatchError::Config(_)));
    assert_eq!(p.source.fetch_since_calls(), 0);
    assert!(notifier.attempts().await.is_empty());
    assert!(!dir.path().join("last_notified_offense").exists());
}

#[tokio::test]
async fn test_corrupt_cursor_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("last_notified_offense"), "one hundred").unwrap();
    let p = pipeline(dir.path(), Arc::new(MemoryNotifier::default()));

    let err = p.scanner.run_cycle().await.unwrap_err();
    assert!(matches!(err, WatchError::CorruptState { .. }));
    assert_eq!(p.source.fetch_since_calls(), 0);
}

#[tokio::test]
async fn test_restart_resumes_without_double_notify() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("last_notified_offense"), "10").unwrap();
    let notifier = Arc::new(MemoryNotifier::default());

    {
        let p = pipeline(dir.path(), notifier.clone());
        p.source.upsert(Offense::new(11, WATCHED, an_hour_ago())).await;
        p.source.upsert(Offense::new(12, WATCHED, an_hour_ago() + 1)).await;
        p.scanner.run_cycle().await.unwrap();
    }

    // New process, source serves stale data that includes handled ids
    let p = pipeline(dir.path(), notifier.clone());
    p.source
        .script_page(vec![
            Offense::new(11, WATCHED, an_hour_ago()),
            Offense::new(12, WATCHED, an_hour_ago() + 1),
            Offense::new(13, WATCHED, an_hour_ago() + 2),
        ])
        .await;
    let report = p.scanner.run_cycle().await.unwrap();

    assert_eq!(report.skipped, vec![11, 12]);
    assert_eq!(report.notified, vec![13]);
    assert_eq!(notifier.delivered(Channel::Forward).await, vec![11, 12, 13]);
    assert_eq!(p.cursor.load().await.unwrap(), Some(13));
}

// ─── Retry drainer ───────────────────────────────────────────────

#[tokio::test]
async fn test_drainer_prunes_closed_and_missing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("failed_notifications"), "102,105").unwrap();
    let notifier = Arc::new(MemoryNotifier::default());
    let p = pipeline(dir.path(), notifier.clone());
    p.source
        .upsert(Offense::new(102, WATCHED, 0).with_status(OffenseStatus::Closed))
        .await;

    let report = p.drainer.run_cycle().await.unwrap();

    assert_eq!(report.pruned, vec![102, 105]);
    assert!(notifier.attempts().await.is_empty());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("failed_notifications")).unwrap(),
        ""
    );
}

#[tokio::test]
async fn test_drainer_tolerates_malformed_queue_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("failed_notifications"), "7,,oops,7, 8").unwrap();
    let notifier = Arc::new(MemoryNotifier::default());
    let p = pipeline(dir.path(), notifier.clone());
    p.source.upsert(Offense::new(7, WATCHED, 0)).await;
    p.source.upsert(Offense::new(8, WATCHED, 0)).await;
    notifier.fail_for(8).await;

    let report = p.drainer.run_cycle().await.unwrap();

    assert_eq!(report.loaded, 2);
    assert_eq!(report.notified, vec![7]);
    assert_eq!(report.retained, vec![8]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("failed_notifications")).unwrap(),
        "8"
    );
}

// ─── Hand-off through the email notifier ─────────────────────────

#[tokio::test]
async fn test_forward_failure_recovered_by_retry_email() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("last_notified_offense"), "500").unwrap();
    let transport = Arc::new(MemoryMailTransport::default());
    let notifier = Arc::new(EmailNotifier::new(
        transport.clone(),
        "alerts@example.com",
        vec!["soc@example.com".to_string()],
        Duration::from_secs(900),
        Duration::from_secs(5),
    ));
    let p = pipeline(dir.path(), notifier);
    p.source.upsert(Offense::new(501, WATCHED, an_hour_ago())).await;

    transport.fail_with(Some(NotifyFailure::Connectivity)).await;
    let scan = p.scanner.run_cycle().await.unwrap();
    assert_eq!(scan.enqueued, vec![501]);
    assert_eq!(p.cursor.load().await.unwrap(), Some(500));

    transport.fail_with(None).await;
    let drain = p.drainer.run_cycle().await.unwrap();
    assert_eq!(drain.notified, vec![501]);
    assert!(p.queue.load_all().await.unwrap().is_empty());

    let sent = transport.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("[ 501 ]"));
    assert!(sent[0].body.contains("Offense ID: 501"));
}

// ─── Concurrency ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scanner_and_drainer_share_queue_without_lost_updates() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("last_notified_offense"), "0").unwrap();

    // Queue holds closed offenses the drainer will prune
    let closed: Vec<u64> = (1000..1040).collect();
    std::fs::write(
        dir.path().join("failed_notifications"),
        closed
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(","),
    )
    .unwrap();

    let notifier = Arc::new(MemoryNotifier::default());
    let p = Arc::new(pipeline(dir.path(), notifier.clone()));
    for id in &closed {
        p.source
            .upsert(Offense::new(*id, WATCHED, 0).with_status(OffenseStatus::Closed))
            .await;
    }
    // Every forward notification fails so each new id is enqueued
    for id in 1..=40u64 {
        p.source
            .upsert(Offense::new(id, WATCHED, an_hour_ago() + id as i64))
            .await;
        notifier.fail_for(id).await;
    }

    let scan = {
        let p = p.clone();
        tokio::spawn(async move { p.scanner.run_cycle().await })
    };
    let drain = {
        let p = p.clone();
        tokio::spawn(async move { p.drainer.run_cycle().await })
    };
    let scan = scan.await.unwrap().unwrap();
    drain.await.unwrap().unwrap();

    assert_eq!(scan.enqueued.len(), 40);

    // Whatever the drainer loaded was closed and is gone; every forward
    // failure survived even though both flows rewrote the file concurrently
    let remaining = ids(p.queue.load_all().await.unwrap());
    let expected: Vec<u64> = (1..=40).collect();
    let forward_failures: Vec<u64> = remaining.iter().copied().filter(|id| *id <= 40).collect();
    assert_eq!(forward_failures, expected);
    assert!(remaining.iter().all(|id| *id <= 40));
}

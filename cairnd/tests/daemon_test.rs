//! Daemon end-to-end: seed the log, run, shut down, inspect the checkpoint.

use std::sync::Arc;
use std::time::Duration;

use cairn_domain::NewEvent;
use cairn_pipeline::CheckpointStore;
use cairn_store::MemoryStore;
use cairn_testkit::{seed_interleaved, wait_until, RecordingHandler};
use cairnd::{Config, Daemon};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_consumes_log_and_checkpoints() {
    let store = Arc::new(MemoryStore::new());
    let handler = Arc::new(RecordingHandler::new());
    let daemon = Daemon::new(Config::test(), store.clone(), handler.clone());

    let log = daemon.event_log();
    let (_, committed) = seed_interleaved(&log, 2, 3).await.unwrap();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(daemon.run_until(shutdown.clone()));

    assert!(wait_until(Duration::from_secs(5), || handler.count() == 6).await);

    // Events appended while running are picked up too
    log.append(Uuid::now_v7(), 0, vec![NewEvent::new("Late", Vec::new())]).await.unwrap();
    assert!(wait_until(Duration::from_secs(5), || handler.count() == 7).await);

    shutdown.cancel();
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.processed, 7);

    let last = CheckpointStore::new(store).get_last("test").await.unwrap();
    let late = handler.seen().last().map(|e| e.event_id);
    assert_eq!(last, late);
    assert_ne!(last, committed.last().map(|e| e.event_id));
}

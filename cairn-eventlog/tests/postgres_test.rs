//! DB-backed integration tests for the event log
//!
//! Run with: `DATABASE_URL=postgres://... cargo test -p cairn-eventlog --features postgres -- --ignored`

#![cfg(feature = "postgres")]

use std::sync::Arc;

use cairn_domain::NewEvent;
use cairn_eventlog::{EventLog, EVENT_SEQUENCE, PIPELINE_SEQUENCE};
use cairn_store::{PgStore, Store};
use sqlx::PgPool;
use uuid::Uuid;

fn new_log(pool: PgPool) -> EventLog<PgStore> {
    EventLog::new(Arc::new(PgStore::new(pool)))
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_append_and_read_back(pool: PgPool) {
    let log = new_log(pool);
    let stream_id = Uuid::now_v7();

    log.append(stream_id, 0, vec![NewEvent::new("Opened", b"{}".to_vec())]).await.unwrap();
    log.append(stream_id, 1, vec![NewEvent::new("Closed", b"{}".to_vec())]).await.unwrap();

    let stored = log.read_stream(stream_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].type_tag, "Closed");
    assert_eq!(log.stream_version(stream_id).await.unwrap(), Some(2));

    let stale = log.append(stream_id, 1, vec![NewEvent::new("Reopened", Vec::new())]).await;
    assert!(stale.unwrap_err().is_concurrency());
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_reader_follows_global_order(pool: PgPool) {
    let log = new_log(pool);

    for _ in 0..5 {
        log.append(Uuid::now_v7(), 0, vec![NewEvent::new("Opened", Vec::new())]).await.unwrap();
    }

    let all = log.reader().get_after(None, 100).await.unwrap();
    assert_eq!(all.len(), 5);
    assert!(all.windows(2).all(|w| w[0].global_seq < w[1].global_seq));

    let tail = log.reader().get_after_event(Some(all[2].event_id), 100).await.unwrap();
    assert_eq!(tail.len(), 2);
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_snapshots_and_counters(pool: PgPool) {
    let log = new_log(pool);
    let stream_id = Uuid::now_v7();

    log.save_snapshot(stream_id, 4, b"four".to_vec()).await.unwrap();
    assert!(log.get_snapshot(stream_id, 3).await.unwrap().is_none());
    assert_eq!(log.get_snapshot(stream_id, 9).await.unwrap().unwrap().payload, b"four".to_vec());

    let first = log.sequences().next(PIPELINE_SEQUENCE).await.unwrap();
    let second = log.sequences().next(PIPELINE_SEQUENCE).await.unwrap();
    assert_eq!(second, first + 1);
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_commit_is_rejected_and_rolled_back_as_a_unit(pool: PgPool) {
    let store = PgStore::new(pool);
    let stream_id = Uuid::now_v7();
    let record = |stream_seq, global_seq| {
        NewEvent::new("Opened", Vec::new()).into_record(stream_id, stream_seq, global_seq)
    };

    assert!(store.events().commit_events(EVENT_SEQUENCE, &[record(0, 1)]).await.unwrap());

    // Counter already at 1
    assert!(!store.events().commit_events(EVENT_SEQUENCE, &[record(1, 1)]).await.unwrap());

    // Duplicate stream_seq in the second row: nothing of the batch stays
    let batch = [record(1, 2), record(0, 3)];
    let result = store.events().commit_events(EVENT_SEQUENCE, &batch).await;
    assert!(result.is_err());
    assert_eq!(store.sequences().find_counter(EVENT_SEQUENCE).await.unwrap(), Some(1));
    assert_eq!(store.events().find_after(None, 10).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_racing_writers_leave_no_position_gaps(pool: PgPool) {
    let log = new_log(pool);
    let mut writers = Vec::new();

    for _ in 0..4 {
        let log = log.clone();
        writers.push(tokio::spawn(async move {
            let stream_id = Uuid::now_v7();
            for version in 0..5 {
                log.append(stream_id, version, vec![NewEvent::new("Tick", Vec::new())])
                    .await
                    .unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let all = log.reader().get_after(None, 100).await.unwrap();
    let positions: Vec<u64> = all.iter().map(|e| e.global_seq).collect();
    assert_eq!(positions, (1..=20).collect::<Vec<u64>>());
}

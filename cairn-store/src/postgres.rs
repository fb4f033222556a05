//! PostgreSQL store.
//!
//! Implements every repository port on top of a `PgPool`. Conditional writes
//! are single statements (`INSERT ... ON CONFLICT DO NOTHING`,
//! `UPDATE ... WHERE version = $expected`) so the compare-and-swap happens
//! inside the database. Committing events is the one transaction: the
//! counter update and the inserts land together.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{
    CheckpointRepository, EventRepository, SequenceRepository, SnapshotRepository, Store,
    StreamRepository,
};
use async_trait::async_trait;
use cairn_domain::{EventId, EventRecord, PipelineCheckpoint, Snapshot, StreamHead, StreamId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and create a store.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run all pending migrations.
    ///
    /// Idempotent: safe to run multiple times.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        info!("Migrations completed successfully");
        Ok(())
    }
}

fn to_db(column: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::out_of_range(column, value))
}

fn from_db(column: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::out_of_range(column, value))
}

/// Bound used for "no upper limit" scans; BIGINT cannot hold u64::MAX.
fn clamp_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct EventRow {
    global_seq: i64,
    stream_id: Uuid,
    stream_seq: i64,
    event_id: Uuid,
    occurred_at: DateTime<Utc>,
    type_tag: String,
    version: String,
    payload: Vec<u8>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            global_seq: from_db("global_seq", row.global_seq)?,
            stream_id: row.stream_id,
            stream_seq: from_db("stream_seq", row.stream_seq)?,
            event_id: row.event_id,
            timestamp: row.occurred_at,
            type_tag: row.type_tag,
            version: row.version,
            payload: row.payload,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HeadRow {
    stream_id: Uuid,
    current_version: i64,
    type_tag: String,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    stream_id: Uuid,
    version: i64,
    payload: Vec<u8>,
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    insertion_order: i64,
    pipeline_name: String,
    last_processed_event_id: Uuid,
    created_at: DateTime<Utc>,
}

fn collect_events(rows: Vec<EventRow>) -> Result<Vec<EventRecord>, StoreError> {
    rows.into_iter().map(EventRecord::try_from).collect()
}

const EVENT_COLUMNS: &str =
    "global_seq, stream_id, stream_seq, event_id, occurred_at, type_tag, version, payload";

// =============================================================================
// Event Repository Implementation
// =============================================================================

#[async_trait]
impl EventRepository for PgStore {
    async fn commit_events(
        &self,
        sequence: &str,
        records: &[EventRecord],
    ) -> Result<bool, StoreError> {
        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Ok(true);
        };
        let expected = first
            .global_seq
            .checked_sub(1)
            .ok_or_else(|| StoreError::out_of_range("global_seq", first.global_seq))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO event_sequences (name, value) VALUES ($1, 0) ON CONFLICT (name) DO NOTHING",
        )
        .bind(sequence)
        .execute(&mut *tx)
        .await?;

        // The row lock taken here is held until commit, so a rival writer
        // re-reads the advanced counter and fails the condition
        let claimed =
            sqlx::query("UPDATE event_sequences SET value = $1 WHERE name = $2 AND value = $3")
                .bind(to_db("value", last.global_seq)?)
                .bind(sequence)
                .bind(to_db("value", expected)?)
                .execute(&mut *tx)
                .await?;

        if claimed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO event_log (
                    global_seq, stream_id, stream_seq, event_id,
                    occurred_at, type_tag, version, payload
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(to_db("global_seq", record.global_seq)?)
            .bind(record.stream_id)
            .bind(to_db("stream_seq", record.stream_seq)?)
            .bind(record.event_id)
            .bind(record.timestamp)
            .bind(&record.type_tag)
            .bind(&record.version)
            .bind(&record.payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn find_by_stream(
        &self,
        stream_id: StreamId,
        min_seq: u64,
        max_seq: u64,
    ) -> Result<Vec<EventRecord>, StoreError> {
        if min_seq > max_seq {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {} FROM event_log \
             WHERE stream_id = $1 AND stream_seq >= $2 AND stream_seq <= $3 \
             ORDER BY stream_seq ASC",
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(stream_id)
            .bind(clamp_to_db(min_seq))
            .bind(clamp_to_db(max_seq))
            .fetch_all(&self.pool)
            .await?;

        collect_events(rows)
    }

    async fn find_after(
        &self,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match after {
            Some(seq) => {
                let query = format!(
                    "SELECT {} FROM event_log WHERE global_seq > $1 \
                     ORDER BY global_seq ASC LIMIT $2",
                    EVENT_COLUMNS
                );
                sqlx::query_as::<_, EventRow>(&query)
                    .bind(clamp_to_db(seq))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            },
            None => {
                let query = format!(
                    "SELECT {} FROM event_log ORDER BY global_seq ASC LIMIT $1",
                    EVENT_COLUMNS
                );
                sqlx::query_as::<_, EventRow>(&query).bind(limit).fetch_all(&self.pool).await?
            },
        };

        collect_events(rows)
    }

    async fn find_global_seq(&self, event_id: EventId) -> Result<Option<u64>, StoreError> {
        let seq: Option<i64> =
            sqlx::query_scalar("SELECT global_seq FROM event_log WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        seq.map(|s| from_db("global_seq", s)).transpose()
    }
}

// =============================================================================
// Stream Repository Implementation
// =============================================================================

#[async_trait]
impl StreamRepository for PgStore {
    async fn find_head(&self, stream_id: StreamId) -> Result<Option<StreamHead>, StoreError> {
        let row = sqlx::query_as::<_, HeadRow>(
            "SELECT stream_id, current_version, type_tag FROM stream_heads WHERE stream_id = $1",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<StreamHead, StoreError> {
            Ok(StreamHead {
                stream_id: r.stream_id,
                current_version: from_db("current_version", r.current_version)?,
                type_tag: r.type_tag,
            })
        })
        .transpose()
    }

    async fn insert_head(&self, head: &StreamHead) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO stream_heads (stream_id, current_version, type_tag)
            VALUES ($1, $2, $3)
            ON CONFLICT (stream_id) DO NOTHING
            "#,
        )
        .bind(head.stream_id)
        .bind(to_db("current_version", head.current_version)?)
        .bind(&head.type_tag)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_set_version(
        &self,
        stream_id: StreamId,
        expected_version: u64,
        new_version: u64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stream_heads
            SET current_version = $1, updated_at = NOW()
            WHERE stream_id = $2 AND current_version = $3
            "#,
        )
        .bind(to_db("current_version", new_version)?)
        .bind(stream_id)
        .bind(to_db("current_version", expected_version)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Snapshot Repository Implementation
// =============================================================================

#[async_trait]
impl SnapshotRepository for PgStore {
    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO snapshots (stream_id, version, payload) VALUES ($1, $2, $3)")
            .bind(snapshot.stream_id)
            .bind(to_db("version", snapshot.version)?)
            .bind(&snapshot.payload)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_snapshot(
        &self,
        stream_id: StreamId,
        max_version: u64,
    ) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT stream_id, version, payload
            FROM snapshots
            WHERE stream_id = $1 AND version <= $2
            ORDER BY version DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(stream_id)
        .bind(clamp_to_db(max_version))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<Snapshot, StoreError> {
            Ok(Snapshot {
                stream_id: r.stream_id,
                version: from_db("version", r.version)?,
                payload: r.payload,
            })
        })
        .transpose()
    }
}

// =============================================================================
// Sequence Repository Implementation
// =============================================================================

#[async_trait]
impl SequenceRepository for PgStore {
    async fn find_counter(&self, name: &str) -> Result<Option<u64>, StoreError> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT value FROM event_sequences WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        value.map(|v| from_db("value", v)).transpose()
    }

    async fn insert_counter(&self, name: &str, value: u64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO event_sequences (name, value) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(to_db("value", value)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_set_counter(
        &self,
        name: &str,
        expected_value: u64,
        new_value: u64,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE event_sequences SET value = $1 WHERE name = $2 AND value = $3")
                .bind(to_db("value", new_value)?)
                .bind(name)
                .bind(to_db("value", expected_value)?)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Checkpoint Repository Implementation
// =============================================================================

#[async_trait]
impl CheckpointRepository for PgStore {
    async fn insert_checkpoint(&self, checkpoint: &PipelineCheckpoint) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_checkpoints (
                insertion_order, pipeline_name, last_processed_event_id, created_at
            ) VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(to_db("insertion_order", checkpoint.insertion_order)?)
        .bind(&checkpoint.pipeline_name)
        .bind(checkpoint.last_processed_event_id)
        .bind(checkpoint.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_latest_checkpoint(
        &self,
        pipeline_name: &str,
    ) -> Result<Option<PipelineCheckpoint>, StoreError> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT insertion_order, pipeline_name, last_processed_event_id, created_at
            FROM pipeline_checkpoints
            WHERE pipeline_name = $1
            ORDER BY insertion_order DESC
            LIMIT 1
            "#,
        )
        .bind(pipeline_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<PipelineCheckpoint, StoreError> {
            Ok(PipelineCheckpoint {
                pipeline_name: r.pipeline_name,
                last_processed_event_id: r.last_processed_event_id,
                insertion_order: from_db("insertion_order", r.insertion_order)?,
                created_at: r.created_at,
            })
        })
        .transpose()
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for PgStore {
    fn events(&self) -> &dyn EventRepository {
        self
    }

    fn streams(&self) -> &dyn StreamRepository {
        self
    }

    fn snapshots(&self) -> &dyn SnapshotRepository {
        self
    }

    fn sequences(&self) -> &dyn SequenceRepository {
        self
    }

    fn checkpoints(&self) -> &dyn CheckpointRepository {
        self
    }
}

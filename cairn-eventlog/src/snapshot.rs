//! Snapshots
//!
//! Snapshots are append-only. Readers get the newest one at or below the
//! version they ask for, so a snapshot never runs ahead of the events a
//! caller is about to replay.

use cairn_domain::{Snapshot, StreamId};
use cairn_store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::append::EventLog;
use crate::types::Result;

impl<S: Store + ?Sized> EventLog<S> {
    /// Store a snapshot of a stream taken at `version`
    pub async fn save_snapshot(
        &self,
        stream_id: StreamId,
        version: u64,
        payload: Vec<u8>,
    ) -> Result<()> {
        let snapshot = Snapshot::new(stream_id, version, payload);
        self.store.snapshots().insert_snapshot(&snapshot).await?;

        debug!(stream_id = %stream_id, version, "Snapshot saved");
        Ok(())
    }

    /// Newest snapshot of a stream with `version <= max_version`
    pub async fn get_snapshot(
        &self,
        stream_id: StreamId,
        max_version: u64,
    ) -> Result<Option<Snapshot>> {
        Ok(self.store.snapshots().find_snapshot(stream_id, max_version).await?)
    }

    /// Store `state` as a JSON snapshot
    pub async fn save_state<T: Serialize>(
        &self,
        stream_id: StreamId,
        version: u64,
        state: &T,
    ) -> Result<()> {
        let payload = serde_json::to_vec(state)?;
        self.save_snapshot(stream_id, version, payload).await
    }

    /// Load the newest JSON snapshot with `version <= max_version`.
    ///
    /// Returns the snapshot's version alongside the decoded state.
    pub async fn load_state<T: DeserializeOwned>(
        &self,
        stream_id: StreamId,
        max_version: u64,
    ) -> Result<Option<(u64, T)>> {
        match self.get_snapshot(stream_id, max_version).await? {
            Some(snapshot) => {
                let state = serde_json::from_slice(&snapshot.payload)?;
                Ok(Some((snapshot.version, state)))
            },
            None => Ok(None),
        }
    }
}

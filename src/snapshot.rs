//! Full-state snapshot export/import, used for Raft log compaction and for
//! bringing a lagging or fresh node up to date. The wire format of the blob
//! is opaque to callers — only `export`/`restore` need to agree on it — so
//! it is encoded with the same `bincode`-over-`serde` pairing the rest of
//! the ambient stack uses for anything that isn't a hand-rolled wire
//! record.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::durable_map::BatchOp;
use crate::error::{Error, Result};
use crate::event_loop::EventLoopHandle;
use crate::state_machine::StateMachine;

/// A self-contained serialization of the entire current key-value mapping.
/// `BTreeMap` gives the blob a canonical byte-order-sorted layout, which
/// isn't load-bearing for correctness (only `decode(encode(M)) = M` is) but
/// keeps snapshots of the same map byte-identical across runs.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
struct SnapshotBlob {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Produces and restores [`SnapshotBlob`]s against a [`StateMachine`]'s
/// [`DurableMap`](crate::durable_map::DurableMap). Both operations are
/// posted to the event loop so they serialize with every other mutation of
/// the map.
pub struct SnapshotEngine {
    state_machine: Arc<StateMachine>,
    loop_handle: EventLoopHandle,
}

impl SnapshotEngine {
    pub fn new(state_machine: Arc<StateMachine>, loop_handle: EventLoopHandle) -> Self {
        Self {
            state_machine,
            loop_handle,
        }
    }

    /// Iterates the durable map into an in-memory snapshot and serializes
    /// it. The iteration sees a consistent point-in-time view (the
    /// engine's own read snapshot); concurrent writes mid-export only ever
    /// produce a snapshot consistent with *some* instant, never a torn one.
    pub async fn export(&self) -> Result<Vec<u8>> {
        let state_machine = self.state_machine.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();

        self.loop_handle.post(async move {
            let result = export_blob(&state_machine).await;
            let _ = tx.send(result);
        });

        rx.await.expect("snapshot export job dropped without a reply")
    }

    /// Decodes `blob` and overlay-replaces the durable map's contents with
    /// it: every key present in the current map but absent from the
    /// snapshot is deleted, and every pair in the snapshot is written, all
    /// as one atomic batch. This preserves durability ordering across the
    /// restore boundary and avoids a window where the map is empty, unlike
    /// a wipe-then-reload.
    pub async fn restore(&self, blob: Vec<u8>) -> Result<()> {
        let state_machine = self.state_machine.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();

        self.loop_handle.post(async move {
            let result = restore_blob(&state_machine, &blob).await;
            let _ = tx.send(result);
        });

        rx.await.expect("snapshot restore job dropped without a reply")
    }
}

async fn export_blob(state_machine: &StateMachine) -> Result<Vec<u8>> {
    let entries: BTreeMap<Vec<u8>, Vec<u8>> = state_machine.durable_map().iterate().await?.collect();
    let blob = SnapshotBlob { entries };
    bincode::serialize(&blob).map_err(|err| Error::StorageError(format!("failed to serialize snapshot: {err}")))
}

async fn restore_blob(state_machine: &StateMachine, blob: &[u8]) -> Result<()> {
    let snapshot: SnapshotBlob =
        bincode::deserialize(blob).map_err(|err| Error::InvalidSnapshot(err.to_string()))?;

    let durable_map = state_machine.durable_map();
    let current: BTreeMap<Vec<u8>, Vec<u8>> = durable_map.iterate().await?.collect();

    let mut ops = Vec::new();
    for key in current.keys() {
        if !snapshot.entries.contains_key(key) {
            ops.push(BatchOp::Delete(key.clone()));
        }
    }
    for (key, value) in snapshot.entries {
        ops.push(BatchOp::Put(key, value));
    }

    durable_map.write_batch(ops).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHarness;
    use bytes::Bytes;

    #[tokio::test]
    async fn snapshot_round_trip_test() {
        let dir = tempfile::tempdir().unwrap();
        let harness = TestHarness::create(dir.path()).await;
        let sm = harness.state_machine.clone();

        sm.set(Bytes::from_static(b"x"), Bytes::from_static(b"1")).await.unwrap().unwrap();
        sm.set(Bytes::from_static(b"y"), Bytes::from_static(b"2")).await.unwrap().unwrap();

        let engine = SnapshotEngine::new(sm.clone(), harness.loop_handle.clone());
        let blob = engine.export().await.unwrap();

        // Reset to a disjoint state, then restore the blob.
        sm.del(vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")])
            .await
            .unwrap()
            .unwrap();
        sm.set(Bytes::from_static(b"z"), Bytes::from_static(b"9")).await.unwrap().unwrap();

        engine.restore(blob).await.unwrap();

        assert_eq!(sm.read(b"x").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(sm.read(b"y").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(sm.read(b"z").await.unwrap(), None);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn empty_map_snapshot_round_trips_test() {
        let dir = tempfile::tempdir().unwrap();
        let harness = TestHarness::create(dir.path()).await;
        let sm = harness.state_machine.clone();

        let engine = SnapshotEngine::new(sm.clone(), harness.loop_handle.clone());
        let blob = engine.export().await.unwrap();
        engine.restore(blob).await.unwrap();

        assert!(sm.keys(b"*").await.unwrap().is_empty());

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_snapshot_is_rejected_test() {
        let dir = tempfile::tempdir().unwrap();
        let harness = TestHarness::create(dir.path()).await;

        let engine = SnapshotEngine::new(harness.state_machine.clone(), harness.loop_handle.clone());
        let result = engine.restore(vec![0xFF, 0xFF, 0xFF]).await;
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));

        harness.shutdown().await;
    }
}

//! Persistent ordered map `bytes -> bytes`, backed by an embedded RocksDB
//! instance. Point operations are synchronous `Result`s; a batch is applied
//! atomically. All disk-touching work runs on the blocking-task pool so the
//! event loop's task is never itself parked on a syscall (see the
//! concurrency notes on suspension points).

use std::path::Path;
use std::sync::Arc;

use rocksdb::{IteratorMode, Options, WriteBatch as RocksWriteBatch, DB};

use crate::error::{Error, Result};

/// One operation in an atomic [`DurableMap::write_batch`].
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

pub struct DurableMap {
    db: Arc<DB>,
}

impl DurableMap {
    /// Opens (creating if missing) the engine's files at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub async fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.get(key).map_err(Error::from))
            .await
            .expect("durable map get task panicked")
    }

    pub async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.put(key, value).map_err(Error::from))
            .await
            .expect("durable map put task panicked")
    }

    /// Idempotent: deleting an absent key is not an error.
    pub async fn delete(&self, key: Vec<u8>) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.delete(key).map_err(Error::from))
            .await
            .expect("durable map delete task panicked")
    }

    /// Applies `ops` as a single atomic batch: either all are durable or
    /// none are.
    pub async fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut batch = RocksWriteBatch::default();
            for op in ops {
                match op {
                    BatchOp::Put(k, v) => batch.put(k, v),
                    BatchOp::Delete(k) => batch.delete(k),
                }
            }
            db.write(batch).map_err(Error::from)
        })
        .await
        .expect("durable map write_batch task panicked")
    }

    /// Materializes a consistent point-in-time view of the whole map.
    ///
    /// Takes a RocksDB snapshot for the consistent view and collects it
    /// eagerly inside the blocking task (the snapshot itself cannot cross
    /// the `spawn_blocking` boundary since it borrows the `DB`), then hands
    /// back a one-shot `IntoIter` over the result so callers still consume
    /// it exactly once.
    pub async fn iterate(&self) -> Result<std::vec::IntoIter<(Vec<u8>, Vec<u8>)>> {
        let db = self.db.clone();
        let entries = tokio::task::spawn_blocking(move || {
            let snapshot = db.snapshot();
            snapshot
                .iterator(IteratorMode::Start)
                .map(|item| {
                    let (k, v) = item.map_err(Error::from)?;
                    Ok((k.to_vec(), v.to_vec()))
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
        .expect("durable map iterate task panicked")?;

        Ok(entries.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, DurableMap) {
        let dir = tempfile::tempdir().unwrap();
        let map = DurableMap::open(dir.path()).unwrap();
        (dir, map)
    }

    #[tokio::test]
    async fn get_put_delete_test() {
        let (_dir, map) = open_temp();

        assert_eq!(map.get(b"foo".to_vec()).await.unwrap(), None);

        map.put(b"foo".to_vec(), b"bar".to_vec()).await.unwrap();
        assert_eq!(map.get(b"foo".to_vec()).await.unwrap(), Some(b"bar".to_vec()));

        map.delete(b"foo".to_vec()).await.unwrap();
        assert_eq!(map.get(b"foo".to_vec()).await.unwrap(), None);

        // Deleting an absent key is not an error.
        map.delete(b"foo".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn write_batch_is_atomic_in_effect_test() {
        let (_dir, map) = open_temp();

        map.put(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        map.put(b"b".to_vec(), b"2".to_vec()).await.unwrap();
        map.put(b"c".to_vec(), b"3".to_vec()).await.unwrap();

        map.write_batch(vec![
            BatchOp::Delete(b"a".to_vec()),
            BatchOp::Delete(b"c".to_vec()),
            BatchOp::Put(b"d".to_vec(), b"4".to_vec()),
        ])
        .await
        .unwrap();

        assert_eq!(map.get(b"a".to_vec()).await.unwrap(), None);
        assert_eq!(map.get(b"b".to_vec()).await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(map.get(b"c".to_vec()).await.unwrap(), None);
        assert_eq!(map.get(b"d".to_vec()).await.unwrap(), Some(b"4".to_vec()));
    }

    #[tokio::test]
    async fn iterate_covers_all_entries_test() {
        let (_dir, map) = open_temp();

        map.put(b"x".to_vec(), b"1".to_vec()).await.unwrap();
        map.put(b"y".to_vec(), b"2".to_vec()).await.unwrap();

        let mut entries: Vec<_> = map.iterate().await.unwrap().collect();
        entries.sort();
        assert_eq!(entries, vec![(b"x".to_vec(), b"1".to_vec()), (b"y".to_vec(), b"2".to_vec())]);
    }

    #[tokio::test]
    async fn empty_bytes_key_and_value_round_trip_test() {
        let (_dir, map) = open_temp();
        map.put(Vec::new(), Vec::new()).await.unwrap();
        assert_eq!(map.get(Vec::new()).await.unwrap(), Some(Vec::new()));
    }
}

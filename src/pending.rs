//! Map from a locally-issued `commit_id` to the completion for that
//! request, plus the `commit_id` allocator. Both live under one lock that
//! exists only so the table can cross the event-loop's posted-task
//! boundary (`Send`); the event loop is the only task that ever takes it.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::Result;

pub type Completion = oneshot::Sender<Result<()>>;

#[derive(Default)]
struct Inner {
    next_commit_id: u32,
    entries: HashMap<u32, Completion>,
}

pub struct PendingTable {
    inner: Mutex<Inner>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Allocates the next `commit_id` for this node. Strictly increasing
    /// across calls.
    pub fn alloc_commit_id(&self) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_commit_id;
        inner.next_commit_id = inner.next_commit_id.wrapping_add(1);
        id
    }

    pub fn insert(&self, commit_id: u32, completion: Completion) {
        self.inner.lock().unwrap().entries.insert(commit_id, completion);
    }

    /// Removes and returns the completion for `commit_id`, if still pending.
    pub fn take(&self, commit_id: u32) -> Option<Completion> {
        self.inner.lock().unwrap().entries.remove(&commit_id)
    }

    /// Number of writes proposed locally whose completion has not yet fired.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_ids_increase_monotonically_test() {
        let table = PendingTable::new();
        let ids: Vec<u32> = (0..5).map(|_| table.alloc_commit_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn insert_and_take_roundtrip_test() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();
        table.insert(1, tx);
        assert_eq!(table.len(), 1);

        let completion = table.take(1).expect("entry should be present");
        completion.send(Ok(())).unwrap();
        assert!(rx.await.unwrap().is_ok());
        assert!(table.is_empty());
    }

    #[test]
    fn take_on_missing_id_returns_none_test() {
        let table = PendingTable::new();
        assert!(table.take(42).is_none());
    }

    #[test]
    fn empty_on_quiescent_table_test() {
        let table = PendingTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }
}

//! The commit pipeline: turns a client write into a proposal, tracks its
//! in-flight identity, and applies committed entries to [`DurableMap`] in
//! log order, routing the completion back to the originating client
//! exactly once.
//!
//! Every public method that mutates state does so by posting a job to the
//! [`EventLoop`]; the method itself returns as soon as the job is enqueued.
//! `read` and `keys` go straight to `DurableMap`, which is safe for
//! concurrent reads from any thread.
pub use crate::codec::Op;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::codec::{self, ProposalRecord};
use crate::consensus::Consensus;
use crate::durable_map::{BatchOp, DurableMap};
use crate::error::{Error, Result};
use crate::event_loop::EventLoopHandle;
use crate::pattern;
use crate::pending::PendingTable;

/// A committed log entry, as delivered by consensus. `data` is the exact
/// bytes previously handed to `Consensus::propose` on some node.
#[derive(Debug, Clone)]
pub struct CommitEntry {
    pub data: Vec<u8>,
}

pub struct StateMachine {
    node_id: u32,
    durable_map: Arc<DurableMap>,
    pending: Arc<PendingTable>,
    consensus: Arc<dyn Consensus>,
    loop_handle: EventLoopHandle,
}

impl StateMachine {
    pub fn new(durable_map: Arc<DurableMap>, consensus: Arc<dyn Consensus>, loop_handle: EventLoopHandle) -> Self {
        Self {
            node_id: consensus.node_id(),
            durable_map,
            pending: Arc::new(PendingTable::new()),
            consensus,
            loop_handle,
        }
    }

    /// Proposes `SET key value`. Returns a receiver that resolves once the
    /// write has been committed and applied (`Ok`) or definitively rejected
    /// (`Err`) — never both.
    pub fn set(&self, key: Bytes, value: Bytes) -> oneshot::Receiver<Result<()>> {
        self.propose(ProposalRecord::set(self.node_id, 0, key, value))
    }

    /// Proposes `DEL key [key ...]`. An empty key list is a no-op that
    /// still completes `Ok`.
    pub fn del(&self, keys: Vec<Bytes>) -> oneshot::Receiver<Result<()>> {
        self.propose(ProposalRecord::del(self.node_id, 0, keys))
    }

    fn propose(&self, mut record: ProposalRecord) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();

        let pending = self.pending.clone();
        let consensus = self.consensus.clone();
        let loop_handle = self.loop_handle.clone();

        // Allocation of the commit id, and recording the pending entry,
        // happens inside the posted job so it is serialized through the
        // event loop along with every other mutation — this is what makes
        // `commit_id` strictly increasing in proposal order.
        self.loop_handle.post(async move {
            record.commit_id = pending.alloc_commit_id();
            pending.insert(record.commit_id, tx);

            let commit_id = record.commit_id;
            let payload = codec::encode(&record).to_vec();

            let result = consensus.propose(payload).await;
            if let Err(rejected) = result {
                let loop_handle = loop_handle.clone();
                loop_handle.post(async move {
                    if let Some(completion) = pending.take(commit_id) {
                        let _ = completion.send(Err(Error::from(rejected)));
                    }
                });
            }
            // On acceptance we do nothing further here: the completion
            // fires later, from `on_commit`, when this entry is actually
            // applied.
        });

        rx
    }

    /// Called by consensus with each committed log entry, in log order.
    /// Posts the decode-and-apply work to the event loop and returns
    /// immediately; `entry` may arrive from any call stack.
    pub fn on_commit(&self, entry: CommitEntry) {
        let durable_map = self.durable_map.clone();
        let pending = self.pending.clone();
        let node_id = self.node_id;

        self.loop_handle.post(async move {
            let record = match codec::decode(&entry.data) {
                Ok(record) => record,
                Err(err) => {
                    // Applied entries are authoritative and unrecoverable;
                    // the origin is unknown at this point, so there is
                    // nothing to surface the error to. Skipping preserves
                    // liveness.
                    tracing::error!(error = %err, "dropping malformed committed entry");
                    return;
                }
            };

            if let Err(err) = apply(&durable_map, &record).await {
                // Apply does not retry; the entry is still considered
                // applied from the log's perspective and the origin's
                // completion still fires Ok.
                tracing::error!(error = %err, commit_id = record.commit_id, "storage error applying committed entry");
            }

            if record.node_id == node_id {
                if let Some(completion) = pending.take(record.commit_id) {
                    let _ = completion.send(Ok(()));
                }
            }
        });
    }

    /// Synchronous point lookup. Callable from any thread.
    pub async fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.durable_map.get(key.to_vec()).await
    }

    /// Returns every key for which `pattern` matches, case-sensitively.
    pub async fn keys(&self, query_pattern: &[u8]) -> Result<Vec<Vec<u8>>> {
        let entries = self.durable_map.iterate().await?;
        Ok(entries
            .filter(|(k, _)| pattern::matches(query_pattern, k, false))
            .map(|(k, _)| k)
            .collect())
    }

    /// Number of locally-issued writes whose completion has not yet fired.
    /// Exposed for tests asserting the pending-table stays bounded.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn durable_map(&self) -> &Arc<DurableMap> {
        &self.durable_map
    }
}

async fn apply(durable_map: &DurableMap, record: &ProposalRecord) -> Result<()> {
    match record.op {
        Op::Set => {
            if record.args.len() != 2 {
                return Err(Error::MalformedRecord(format!(
                    "SET requires exactly 2 args, got {}",
                    record.args.len()
                )));
            }
            durable_map
                .put(record.args[0].to_vec(), record.args[1].to_vec())
                .await
        }
        Op::Del => {
            let ops = record.args.iter().map(|k| BatchOp::Delete(k.to_vec())).collect();
            durable_map.write_batch(ops).await
        }
        Op::Unsupported(code) => {
            tracing::error!(op = code, "dropping committed entry with unsupported op");
            Err(Error::UnsupportedOp(code))
        }
    }
}

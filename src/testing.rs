//! An in-process, single-node harness that stands in for a real consensus
//! cluster in tests, since Raft itself is an external collaborator here.
//!
//! [`LoopbackConsensus`] accepts every proposal and immediately feeds it
//! back through [`StateMachine::on_commit`], so a single committed write
//! round-trips through the exact same pipeline a real multi-node cluster
//! would use: encode, propose, (synchronously, here) commit, decode, apply,
//! complete.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::consensus::{Consensus, ProposeRejected};
use crate::durable_map::DurableMap;
use crate::event_loop::{EventLoop, EventLoopHandle};
use crate::state_machine::{CommitEntry, StateMachine};

pub struct LoopbackConsensus {
    node_id: u32,
    reject: bool,
    sink: Mutex<Option<Arc<StateMachine>>>,
}

impl LoopbackConsensus {
    pub fn new(node_id: u32) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            reject: false,
            sink: Mutex::new(None),
        })
    }

    pub fn always_rejects(node_id: u32) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            reject: true,
            sink: Mutex::new(None),
        })
    }

    /// Wires this consensus stand-in to the state machine it feeds
    /// commits into. Exposed beyond this module so [`crate::node::Node`]
    /// can reuse the same loopback consensus outside of tests (see the
    /// crate-level docs on the current single-node-only story).
    pub(crate) fn bind(&self, state_machine: Arc<StateMachine>) {
        *self.sink.lock().unwrap() = Some(state_machine);
    }
}

#[async_trait]
impl Consensus for LoopbackConsensus {
    fn node_id(&self) -> u32 {
        self.node_id
    }

    async fn propose(&self, payload: Vec<u8>) -> Result<(), ProposeRejected> {
        if self.reject {
            return Err(ProposeRejected("rejected by test harness".into()));
        }
        let sink = self.sink.lock().unwrap().clone();
        if let Some(state_machine) = sink {
            state_machine.on_commit(CommitEntry { data: payload });
        }
        Ok(())
    }
}

/// A running single-node instance wired to a [`LoopbackConsensus`].
pub struct TestHarness {
    pub state_machine: Arc<StateMachine>,
    pub loop_handle: EventLoopHandle,
    runner: tokio::task::JoinHandle<()>,
}

impl TestHarness {
    pub async fn create(dir: &Path) -> Self {
        Self::create_with(dir, LoopbackConsensus::new(1)).await
    }

    pub async fn create_always_rejecting(dir: &Path) -> Self {
        Self::create_with(dir, LoopbackConsensus::always_rejects(1)).await
    }

    async fn create_with(dir: &Path, consensus: Arc<LoopbackConsensus>) -> Self {
        let durable_map = Arc::new(DurableMap::open(dir).expect("open durable map"));
        let (event_loop, loop_handle) = EventLoop::new();
        let state_machine = Arc::new(StateMachine::new(
            durable_map,
            consensus.clone(),
            loop_handle.clone(),
        ));
        consensus.bind(state_machine.clone());

        let runner = tokio::spawn(event_loop.run());

        Self {
            state_machine,
            loop_handle,
            runner,
        }
    }

    /// Posts a no-op marker job and waits for it, guaranteeing every job
    /// posted before this call has already run.
    pub async fn drain(&self) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.loop_handle.post(async move {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    pub async fn shutdown(self) {
        self.loop_handle.stop();
        let _ = self.runner.await;
    }
}

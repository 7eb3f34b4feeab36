//! Wires the leaf components into a runnable node: opens the durable map
//! at the configured persisted-state path, builds the event loop and
//! state machine, and serves the client gateway until asked to stop.
//!
//! Real multi-node Raft is an external collaborator out of scope for this
//! crate (see the crate-level docs): a node in this binary runs as a
//! single-member group using [`testing::LoopbackConsensus`], the same
//! immediate-commit stand-in the test harness uses, as the plug-in point
//! where a production build would instead wire a real consensus
//! implementation satisfying [`Consensus`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Args;
use crate::consensus::Consensus;
use crate::durable_map::DurableMap;
use crate::error::Result;
use crate::event_loop::{EventLoop, EventLoopHandle};
use crate::gateway::ClientGateway;
use crate::snapshot::SnapshotEngine;
use crate::state_machine::StateMachine;
use crate::testing::LoopbackConsensus;

pub struct Node {
    pub state_machine: Arc<StateMachine>,
    pub snapshot_engine: SnapshotEngine,
    event_loop: EventLoop,
    loop_handle: EventLoopHandle,
    gateway: ClientGateway,
    port: u16,
}

impl Node {
    /// Opens the durable map under `config`'s persisted-state directory and
    /// assembles the rest of the node around it.
    pub async fn open(config: &Args) -> Result<Self> {
        let db_dir = config.db_dir();
        std::fs::create_dir_all(&db_dir)?;

        let durable_map = Arc::new(DurableMap::open(&db_dir)?);
        let (event_loop, loop_handle) = EventLoop::new();

        let consensus = LoopbackConsensus::new(config.node_id);
        let state_machine = Arc::new(StateMachine::new(
            durable_map,
            consensus.clone() as Arc<dyn Consensus>,
            loop_handle.clone(),
        ));

        // The loopback consensus needs a handle back to the state machine
        // it feeds commits into, which doesn't exist until just above.
        consensus.bind(state_machine.clone());

        let snapshot_engine = SnapshotEngine::new(state_machine.clone(), loop_handle.clone());
        let cancel = loop_handle.cancellation_token();
        let gateway = ClientGateway::new(state_machine.clone(), cancel);

        Ok(Self {
            state_machine,
            snapshot_engine,
            event_loop,
            loop_handle,
            gateway,
            port: config.port,
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.loop_handle.cancellation_token()
    }

    /// Runs the event loop and the client gateway concurrently until
    /// `stop()` is observed on either.
    pub async fn run(self) -> Result<()> {
        let Node {
            event_loop,
            gateway,
            port,
            ..
        } = self;

        let loop_task = tokio::spawn(event_loop.run());
        let serve_result = gateway.serve(("0.0.0.0", port)).await;
        loop_task.await.expect("event loop task panicked");
        serve_result.map_err(crate::error::Error::from)
    }
}

//! The consensus collaborator boundary. Raft itself — leader election, log
//! replication, snapshot transport — is out of scope for this core; it is
//! reached only through this trait.
//!
//! Commit delivery runs in the other direction and so isn't part of the
//! trait: whatever drives a real consensus implementation calls
//! [`crate::state_machine::StateMachine::on_commit`] directly with each
//! entry as it becomes committed, in log order.

use async_trait::async_trait;

use crate::error::Error;

/// A proposal the consensus layer could not accept (not leader, shutting
/// down, etc).
#[derive(Debug, Clone)]
pub struct ProposeRejected(pub String);

impl From<ProposeRejected> for Error {
    fn from(rejected: ProposeRejected) -> Self {
        Error::ProposeRejected(rejected.0)
    }
}

#[async_trait]
pub trait Consensus: Send + Sync {
    /// Identity of this node, used to tag every proposal it originates.
    fn node_id(&self) -> u32;

    /// Hands an opaque, already-encoded proposal to consensus. Resolves
    /// once the proposal has been durably accepted into the log (`Ok`) or
    /// definitively rejected (`Err`) — never both, never neither.
    async fn propose(&self, payload: Vec<u8>) -> Result<(), ProposeRejected>;
}

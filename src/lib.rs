//! Replicated key-value state machine and client gateway for a Raft-backed
//! store.
//!
//! This crate implements the command-to-commit pipeline (a client write
//! becomes a deterministic proposal, tracked until the consensus layer
//! commits it and it is applied to durable storage), the durable state
//! machine itself (an embedded ordered map plus snapshot export/import and
//! pattern-based enumeration), and the single-threaded event loop that
//! ties both to a multi-threaded consensus and disk layer. The Raft
//! protocol proper — leader election, log replication, snapshot transport
//! — is an external collaborator reached only through the [`Consensus`]
//! trait; it is not implemented here.

pub mod codec;
pub mod config;
pub mod consensus;
pub mod durable_map;
pub mod error;
pub mod event_loop;
pub mod gateway;
pub mod node;
pub mod pattern;
pub mod pending;
pub mod snapshot;
pub mod state_machine;
pub mod testing;

pub use consensus::Consensus;
pub use error::{Error, Result};
pub use node::Node;
pub use state_machine::StateMachine;

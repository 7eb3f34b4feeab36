//! Process configuration: a small `clap`-derived args struct parsed in
//! `main` and handed straight into a `run(config)` entry point.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "raftkv-server", about = "Replicated key-value store node")]
pub struct Args {
    /// Identifier of this node, used to tag every proposal it originates.
    #[arg(long, default_value_t = 1)]
    pub node_id: u32,

    /// Port the client gateway listens on.
    #[arg(long, default_value_t = 6380)]
    pub port: u16,

    /// Root directory for this node's persisted state. The embedded
    /// engine's files live under `<dir>/node_<id>/db/`.
    #[arg(long, default_value = "data")]
    pub dir: PathBuf,
}

impl Args {
    /// Per-node directory holding the embedded engine's files.
    pub fn db_dir(&self) -> PathBuf {
        self.dir.join(format!("node_{}", self.node_id)).join("db")
    }
}

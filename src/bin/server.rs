use clap::Parser;
use raftkv::config::Args;
use raftkv::node::Node;

#[tokio::main]
async fn main() -> raftkv::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::info!(node_id = args.node_id, port = args.port, dir = ?args.dir, "starting raftkv node");

    let node = Node::open(&args).await?;
    let cancel = node.cancellation_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, shutting down");
            cancel.cancel();
        }
    });

    node.run().await
}

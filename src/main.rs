use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use farmlink_core::node::PeerNode;

/// Start a peer on the farm-to-farm alert overlay.
#[derive(Debug, Parser)]
#[command(name = "farmlinkd", version, about)]
struct Args {
    /// Host this peer listens on.
    #[arg(long, env = "FARMLINK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port this peer listens on.
    #[arg(long, env = "FARMLINK_PORT", default_value_t = 9000)]
    port: u16,

    /// Directory for the identity file and offline-message database.
    #[arg(long, env = "FARMLINK_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Peer(s) to dial on startup, as host:port. May be repeated.
    #[arg(long = "connect", value_name = "HOST:PORT")]
    connect: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("farmlink_core=info".parse()?))
        .init();

    let args = Args::parse();

    let node = PeerNode::new(args.host.clone(), args.port, args.data_dir.clone()).await?;
    let handle = node.handle();

    for target in &args.connect {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid --connect target {target:?}, expected host:port"))?;
        let port: u16 = port.parse()?;
        tracing::info!(host, port, "dialing initial peer");
        if let Err(e) = handle.connect(host.to_string(), port).await {
            tracing::warn!(host, port, "initial connect failed: {e}");
        }
    }

    tracing::info!(host = %args.host, port = args.port, data_dir = %args.data_dir.display(), "starting peer node");
    node.run().await?;
    Ok(())
}

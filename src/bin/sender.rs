use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap_derive::Parser;
use tracing::{info, Level};

use ruft::config::SenderConfig;
use ruft::sender::{Sender, TransferOutcome};

/// Send a single file to a receiving endpoint.
#[derive(Parser)]
struct Args {
    /// receiver host name or IP address
    host: String,

    /// receiver UDP port
    port: u16,

    /// file to transfer
    file: PathBuf,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

fn init_logging(args: &Args) {
    let level = if args.very_verbose {
        Level::TRACE
    } else if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn resolve_peer(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("cannot resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("no address found for {}:{}", host, port))
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let peer_addr = resolve_peer(&args.host, args.port).await?;
    let mut sender = Sender::new(SenderConfig::new(peer_addr)).await?;

    match sender.send_file(&args.file).await? {
        TransferOutcome::Completed => info!("transfer complete"),
        TransferOutcome::Interrupted => {}
    }
    Ok(())
}

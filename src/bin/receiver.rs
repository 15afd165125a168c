use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use clap_derive::Parser;
use tracing::Level;

use ruft::config::ReceiverConfig;
use ruft::receiver::Receiver;

/// Receive files, one client at a time, materializing each transfer as
/// `<client_id>.file`.
#[derive(Parser)]
struct Args {
    /// UDP port to listen on
    port: u16,

    /// directory the output files are written into
    #[clap(long, default_value = ".")]
    output_dir: PathBuf,

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

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port);
    let mut config = ReceiverConfig::new(bind_addr);
    config.output_dir = args.output_dir.clone();

    let mut receiver = Receiver::new(config).await?;
    receiver.serve().await
}

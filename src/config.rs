use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;

use crate::packet_header::PacketHeader;

/// Upper bound on the size of a single datagram, header included.
///
/// This must fit every network link between the endpoints without IP-level
///  fragmentation. The protocol makes no attempt at path-MTU discovery, so the
///  value is deliberately conservative.
pub const MAX_PACKET_SIZE: usize = 524;

/// Maximum payload bytes per data frame.
pub const MSS: usize = MAX_PACKET_SIZE - PacketHeader::SERIALIZED_LEN;

pub struct SenderConfig {
    pub peer_addr: SocketAddr,

    /// Initial congestion window, in bytes.
    pub initial_cwnd: usize,

    /// Hard upper bound on the congestion window. This caps the number of
    ///  unacknowledged bytes regardless of how well the transfer is going.
    pub max_cwnd: usize,

    /// Initial slow-start threshold: above it, window growth switches from
    ///  one MSS per ACK to roughly one MSS per round trip.
    pub initial_ssthresh: usize,

    /// Floor for the slow-start threshold after a loss event.
    pub min_ssthresh: usize,

    pub retransmission_timeout: Duration,

    /// A peer silent for this long aborts the transfer. Much longer than the
    ///  receiver's counterpart: the sender tolerates slow receivers.
    pub dead_peer_timeout: Duration,

    /// After the teardown exchange the sender keeps answering retransmitted
    ///  FIN|ACK frames for this long before exiting.
    pub fin_linger: Duration,
}

impl SenderConfig {
    pub fn new(peer_addr: SocketAddr) -> SenderConfig {
        SenderConfig {
            peer_addr,
            initial_cwnd: 512,
            max_cwnd: 10240,
            initial_ssthresh: 5120,
            min_ssthresh: 1024,
            retransmission_timeout: Duration::from_millis(500),
            dead_peer_timeout: Duration::from_secs(100),
            fin_linger: Duration::from_secs(2),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.initial_cwnd < MSS {
            bail!("initial congestion window is smaller than one MSS");
        }
        if self.max_cwnd < self.initial_cwnd {
            bail!("maximum congestion window is smaller than the initial window");
        }
        if self.min_ssthresh < MSS {
            bail!("ssthresh floor is smaller than one MSS");
        }
        if self.initial_ssthresh < self.min_ssthresh {
            bail!("initial ssthresh is below the ssthresh floor");
        }
        if self.retransmission_timeout.is_zero() || self.dead_peer_timeout.is_zero() {
            bail!("timer durations must be nonzero");
        }
        Ok(())
    }
}

pub struct ReceiverConfig {
    pub bind_addr: SocketAddr,

    /// Directory the per-session output files are materialized into.
    pub output_dir: PathBuf,

    pub retransmission_timeout: Duration,

    /// A client silent for this long has its session abandoned; the receiver
    ///  then waits for the next SYN.
    pub dead_peer_timeout: Duration,
}

impl ReceiverConfig {
    pub fn new(bind_addr: SocketAddr) -> ReceiverConfig {
        ReceiverConfig {
            bind_addr,
            output_dir: PathBuf::from("."),
            retransmission_timeout: Duration::from_millis(500),
            dead_peer_timeout: Duration::from_secs(10),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retransmission_timeout.is_zero() || self.dead_peer_timeout.is_zero() {
            bail!("timer durations must be nonzero");
        }
        Ok(())
    }
}

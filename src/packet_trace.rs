use tracing::info;

use crate::packet_header::PacketHeader;

/// One trace line per datagram crossing the wire, in the fixed format
///  `SEND|RECV <seq> <ack> <cwnd> <ssthresh> <FLAGS> [DUP]`.
///
/// The receiver has no congestion window and logs both window fields as 0.
/// `DUP` is appended only to receiver-side retransmissions of the latest
///  cumulative ACK.

pub fn log_send(header: &PacketHeader, cwnd: usize, ssthresh: usize, dup: bool) {
    if dup {
        info!(
            "SEND {} {} {} {} {} DUP",
            header.seq_number,
            header.ack_number,
            cwnd,
            ssthresh,
            flags_label(header)
        );
    } else {
        info!(
            "SEND {} {} {} {} {}",
            header.seq_number,
            header.ack_number,
            cwnd,
            ssthresh,
            flags_label(header)
        );
    }
}

pub fn log_recv(header: &PacketHeader, cwnd: usize, ssthresh: usize) {
    info!(
        "RECV {} {} {} {} {}",
        header.seq_number,
        header.ack_number,
        cwnd,
        ssthresh,
        flags_label(header)
    );
}

fn flags_label(header: &PacketHeader) -> &'static str {
    match (header.ack, header.syn, header.fin) {
        (true, true, _) => "ACK SYN",
        (true, false, true) => "ACK FIN",
        (true, false, false) => "ACK",
        (false, true, _) => "SYN",
        (false, false, true) => "FIN",
        (false, false, false) => "",
    }
}

//! A one-shot file transfer protocol over UDP, providing TCP-style reliability,
//!  in-order delivery and congestion control in the application layer.
//!
//! ## Design goals
//!
//! * One *sender* transmits exactly one file to one *receiver*, which serializes
//!   the received bytes to disk
//!   * the receiver serves clients strictly sequentially, one session at a time
//!   * explicitly *not* a messaging system with multiplexed streams, pub/sub,
//!      bidirectional traffic etc. --> different trade-offs
//! * All reliability guarantees live in the endpoints because UDP offers none:
//!   * connection establishment via a three-way handshake, orderly teardown via
//!     FIN / FIN|ACK / ACK with a linger period absorbing retransmissions
//!   * cumulative acknowledgement with byte-granular sequence numbers
//!   * a sliding congestion window on the sender: slow start, congestion
//!     avoidance, fast retransmit, fast recovery, retransmission timeout
//!   * an ordered reassembly buffer on the receiver: out-of-order frames are
//!     buffered and spliced into the contiguous run once the gap fills
//! * Each endpoint is a single task around one blocking wait, multiplexing the
//!   socket, a retransmission timer, a dead-peer timer and POSIX termination
//!   signals
//! * Sequence numbers wrap at a small modulus, so all comparisons use
//!   wrap-around arithmetic ("distance of at most half the ring is forward")
//!
//! ## Header
//!
//! Packet header (inside a UDP datagram), 12 bytes, numeric fields
//!  little-endian:
//! ```ascii
//! 0:  sequence number (u16) - sequence of the first payload byte, or of the
//!      control frame itself; wraps at 25600
//! 2:  ack number (u16) - cumulative ACK: the next sequence number expected
//!      from the peer
//! 4:  ACK flag (u8, 0 or 1)
//! 5:  SYN flag (u8, 0 or 1)
//! 6:  FIN flag (u8, 0 or 1)
//! 7:  padding (5 bytes, zero)
//! ```
//!
//! A datagram is the header followed by 0..=512 payload bytes, so the maximum
//!  datagram size is 524 bytes. Only data frames carry payload; control frames
//!  (`SYN`, `SYN|ACK`, `FIN`, `FIN|ACK`, bare `ACK`) are header-only.
//!
//! ## Timers
//!
//! * *retransmission timer*, 500 ms single-shot: drives resends of the oldest
//!   unacknowledged frame (sender) or of the latest cumulative ACK (receiver)
//! * *dead-peer timer*, 100 s on the sender and 10 s on the receiver: a silent
//!   peer aborts the transfer (sender) or abandons the session (receiver). The
//!   asymmetry is deliberate - the sender tolerates slow receivers.

pub mod config;
pub mod congestion;
pub mod event_loop;
pub mod inflight;
pub mod packet_header;
pub mod packet_trace;
pub mod reassembly;
pub mod receiver;
pub mod send_pipeline;
pub mod sender;
pub mod seq;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::{SenderConfig, MAX_PACKET_SIZE, MSS};
use crate::congestion::CongestionController;
use crate::event_loop::{Event, EventLoop};
use crate::inflight::InflightQueue;
use crate::packet_header::{encode_frame, PacketHeader};
use crate::packet_trace;
use crate::send_pipeline::SendPipeline;
use crate::seq::SeqNumber;

#[derive(Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    /// A termination signal arrived; all resources were released.
    Interrupted,
}

/// Outcome of one protocol phase: carry on, or wind down after a signal.
enum Step<T> {
    Proceed(T),
    Interrupted,
}

/// A pre-computed data frame: the wire image is built once up front and only
///  ever re-sent verbatim.
struct DataFrame {
    header: PacketHeader,
    frame: Bytes,
    payload_len: usize,
}

/// The sending endpoint: transmits one file through a three-way handshake, a
///  congestion-controlled data phase and a four-way teardown, then exits.
pub struct Sender {
    config: SenderConfig,
    send_pipeline: SendPipeline,
    event_loop: EventLoop,
}

impl Sender {
    pub async fn new(config: SenderConfig) -> anyhow::Result<Sender> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        info!(
            "bound sender socket to {:?}, peer is {:?}",
            socket.local_addr()?,
            config.peer_addr
        );

        let event_loop = EventLoop::new(
            socket.clone(),
            config.retransmission_timeout,
            config.dead_peer_timeout,
        )?;

        Ok(Sender {
            config,
            send_pipeline: SendPipeline::new(Arc::new(socket)),
            event_loop,
        })
    }

    /// Read the whole input file, then transfer it.
    pub async fn send_file(&mut self, path: &Path) -> anyhow::Result<TransferOutcome> {
        let message = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read input file {:?}", path))?;
        info!("transferring {} bytes from {:?}", message.len(), path);
        self.send_message(&message).await
    }

    pub async fn send_message(&mut self, message: &[u8]) -> anyhow::Result<TransferOutcome> {
        let mut controller = CongestionController::new(&self.config);
        let isn = SeqNumber::random();

        let peer_seq = match self.handshake(isn, &controller).await? {
            Step::Proceed(peer_seq) => peer_seq,
            Step::Interrupted => return Ok(TransferOutcome::Interrupted),
        };

        let seq_number = isn.next();
        let ack_number = peer_seq.next();

        let frames = build_data_frames(message, seq_number, ack_number);
        if frames.is_empty() {
            // nothing to transfer - go straight to teardown
            debug!("input is empty, skipping the data phase");
        } else if let Step::Interrupted = self.run_data_phase(&frames, &mut controller).await? {
            return Ok(TransferOutcome::Interrupted);
        }

        let fin_seq = seq_number.plus(message.len());
        match self.teardown(fin_seq, &controller).await? {
            Step::Proceed(()) => Ok(TransferOutcome::Completed),
            Step::Interrupted => Ok(TransferOutcome::Interrupted),
        }
    }

    /// Send SYN, await the matching SYN|ACK. Returns the peer's initial
    ///  sequence number.
    async fn handshake(
        &mut self,
        isn: SeqNumber,
        controller: &CongestionController,
    ) -> anyhow::Result<Step<SeqNumber>> {
        let syn_header = PacketHeader::syn(isn);
        let syn_frame = encode_frame(&syn_header, &[]);
        let expect_ack = isn.next();

        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        self.event_loop.arm_dead_peer();

        loop {
            self.send_pipeline
                .do_send_packet(self.config.peer_addr, &syn_frame)
                .await;
            packet_trace::log_send(&syn_header, controller.cwnd(), controller.ssthresh(), false);
            self.event_loop.arm_retransmission();

            loop {
                match self.event_loop.next(&mut buf).await {
                    Event::Datagram { len, from } => {
                        let Some(header) = self.decode_from_peer(&buf[..len], from) else {
                            continue;
                        };
                        packet_trace::log_recv(&header, controller.cwnd(), controller.ssthresh());

                        if header.ack && header.ack_number == expect_ack {
                            return Ok(Step::Proceed(header.seq_number));
                        }
                        warn!(
                            "unexpected packet during handshake (ack number {}, expected {}) - dropping",
                            header.ack_number, expect_ack
                        );
                    }
                    Event::RetransTimer => break, // resend the SYN
                    Event::DeadPeerTimer => bail!("peer did not answer the handshake"),
                    Event::Termination => {
                        info!("caught termination signal, exiting");
                        return Ok(Step::Interrupted);
                    }
                }
            }
        }
    }

    /// The congestion-controlled sliding-window loop: fill the window, wait
    ///  for one event, dispatch it, shrink back into the window if it
    ///  contracted. Terminates when every frame is sent and acknowledged.
    async fn run_data_phase(
        &mut self,
        frames: &[DataFrame],
        controller: &mut CongestionController,
    ) -> anyhow::Result<Step<()>> {
        let mut inflight = InflightQueue::new();
        let mut next_index: usize = 0;
        let mut last_unacked_seq = frames[0].header.seq_number;
        let mut remaining_bytes: usize = frames.iter().map(|f| f.payload_len).sum();

        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        self.event_loop.arm_dead_peer();
        self.event_loop.arm_retransmission();

        while next_index < frames.len() || !inflight.is_empty() {
            // fill the congestion window
            while next_index < frames.len()
                && inflight.bytes() + frames[next_index].payload_len <= controller.cwnd()
            {
                let next = &frames[next_index];
                self.send_pipeline
                    .do_send_packet(self.config.peer_addr, &next.frame)
                    .await;
                packet_trace::log_send(&next.header, controller.cwnd(), controller.ssthresh(), false);
                inflight.push_back(next.payload_len);
                next_index += 1;
            }

            match self.event_loop.next(&mut buf).await {
                Event::Datagram { len, from } => {
                    let Some(header) = self.decode_from_peer(&buf[..len], from) else {
                        continue;
                    };
                    packet_trace::log_recv(&header, controller.cwnd(), controller.ssthresh());

                    if header.ack_number.is_after(last_unacked_seq) {
                        let advanced = header.ack_number.offset_from(last_unacked_seq) as usize;
                        if advanced > remaining_bytes {
                            warn!(
                                "cumulative ACK {} acknowledges {} bytes but only {} are outstanding - dropping",
                                header.ack_number, advanced, remaining_bytes
                            );
                            continue;
                        }

                        self.event_loop.arm_retransmission();
                        self.event_loop.arm_dead_peer();

                        // drain acknowledged frames from the head of the queue
                        let mut to_consume = advanced;
                        while to_consume > 0 {
                            let Some(payload_len) = inflight.pop_front() else {
                                break;
                            };
                            to_consume = to_consume.saturating_sub(payload_len);
                        }
                        // a cumulative ACK can reach past everything in flight
                        // (frames dropped from the queue tail earlier); skip them
                        while to_consume > 0 && next_index < frames.len() {
                            to_consume = to_consume.saturating_sub(frames[next_index].payload_len);
                            next_index += 1;
                        }

                        remaining_bytes -= advanced;
                        last_unacked_seq = header.ack_number;
                        controller.on_new_ack();
                    } else {
                        if controller.on_dup_ack() {
                            self.retransmit_oldest(frames, next_index, &inflight, controller)
                                .await;
                        }
                        self.event_loop.arm_dead_peer();
                    }
                }
                Event::RetransTimer => {
                    controller.on_timeout();
                    self.retransmit_oldest(frames, next_index, &inflight, controller)
                        .await;
                }
                Event::DeadPeerTimer => {
                    bail!(
                        "peer silent for {:?} - aborting the transfer",
                        self.config.dead_peer_timeout
                    );
                }
                Event::Termination => {
                    info!("caught termination signal, exiting");
                    return Ok(Step::Interrupted);
                }
            }

            // the window may have contracted: push frames back out of the
            // in-flight queue until it fits again
            while inflight.bytes() > controller.cwnd() {
                if inflight.pop_back().is_none() {
                    break;
                }
                next_index -= 1;
            }
        }

        Ok(Step::Proceed(()))
    }

    async fn retransmit_oldest(
        &self,
        frames: &[DataFrame],
        next_index: usize,
        inflight: &InflightQueue,
        controller: &CongestionController,
    ) {
        if inflight.is_empty() {
            return;
        }
        let oldest = &frames[next_index - inflight.len()];
        self.send_pipeline
            .do_send_packet(self.config.peer_addr, &oldest.frame)
            .await;
        packet_trace::log_send(&oldest.header, controller.cwnd(), controller.ssthresh(), false);
    }

    /// Send FIN, await FIN|ACK, answer with a bare ACK, then linger for the
    ///  configured interval absorbing retransmitted FIN|ACKs.
    async fn teardown(
        &mut self,
        fin_seq: SeqNumber,
        controller: &CongestionController,
    ) -> anyhow::Result<Step<()>> {
        let fin_header = PacketHeader::fin(fin_seq);
        let fin_frame = encode_frame(&fin_header, &[]);
        let expect_ack = fin_seq.next();

        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        self.event_loop.arm_dead_peer();

        'resend: loop {
            self.send_pipeline
                .do_send_packet(self.config.peer_addr, &fin_frame)
                .await;
            packet_trace::log_send(&fin_header, controller.cwnd(), controller.ssthresh(), false);
            self.event_loop.arm_retransmission();

            loop {
                match self.event_loop.next(&mut buf).await {
                    Event::Datagram { len, from } => {
                        let Some(header) = self.decode_from_peer(&buf[..len], from) else {
                            continue;
                        };
                        packet_trace::log_recv(&header, controller.cwnd(), controller.ssthresh());

                        if header.ack && header.fin && header.ack_number == expect_ack {
                            self.answer_fin_ack(fin_seq, &header, controller).await;
                            break 'resend;
                        }
                        warn!("unexpected packet during teardown - dropping");
                        self.event_loop.arm_dead_peer();
                    }
                    Event::RetransTimer => continue 'resend,
                    Event::DeadPeerTimer => bail!("peer silent during teardown"),
                    Event::Termination => {
                        info!("caught termination signal, exiting");
                        return Ok(Step::Interrupted);
                    }
                }
            }
        }

        // absorb retransmitted FIN|ACKs for a while: our final ACK may get
        // lost, and the peer must not be left hanging
        self.event_loop.disarm_dead_peer();
        self.event_loop
            .arm_retransmission_for(self.config.fin_linger);
        loop {
            match self.event_loop.next(&mut buf).await {
                Event::Datagram { len, from } => {
                    let Some(header) = self.decode_from_peer(&buf[..len], from) else {
                        continue;
                    };
                    packet_trace::log_recv(&header, controller.cwnd(), controller.ssthresh());

                    if header.ack && header.fin {
                        self.answer_fin_ack(fin_seq, &header, controller).await;
                    }
                }
                Event::RetransTimer => break, // linger over
                Event::DeadPeerTimer => break,
                Event::Termination => {
                    info!("caught termination signal, exiting");
                    return Ok(Step::Interrupted);
                }
            }
        }

        Ok(Step::Proceed(()))
    }

    /// Payload-free ACK answering a FIN|ACK; the sequence number stays put.
    async fn answer_fin_ack(
        &self,
        fin_seq: SeqNumber,
        fin_ack: &PacketHeader,
        controller: &CongestionController,
    ) {
        let reply = PacketHeader::ack(fin_seq, fin_ack.seq_number.next());
        self.send_pipeline
            .do_send_packet(self.config.peer_addr, &encode_frame(&reply, &[]))
            .await;
        packet_trace::log_send(&reply, controller.cwnd(), controller.ssthresh(), false);
    }

    /// Decode a datagram, dropping (with a log line) anything that is not a
    ///  parseable header from the configured peer.
    fn decode_from_peer(&self, datagram: &[u8], from: std::net::SocketAddr) -> Option<PacketHeader> {
        if from != self.config.peer_addr {
            debug!("dropping datagram from unrelated peer {:?}", from);
            return None;
        }
        match PacketHeader::deser(&mut &datagram[..]) {
            Ok(header) => Some(header),
            Err(e) => {
                warn!("dropping malformed datagram from {:?}: {}", from, e);
                None
            }
        }
    }
}

/// Chop the message into MSS-sized payloads; each frame carries the running
///  sequence of its first byte and the handshake-derived ack number.
fn build_data_frames(message: &[u8], mut seq: SeqNumber, ack_number: SeqNumber) -> Vec<DataFrame> {
    let mut frames = Vec::with_capacity(message.len().div_ceil(MSS));
    for chunk in message.chunks(MSS) {
        let header = PacketHeader::ack(seq, ack_number);
        frames.push(DataFrame {
            header,
            frame: encode_frame(&header, chunk),
            payload_len: chunk.len(),
        });
        seq = seq.plus(chunk.len());
    }
    frames
}

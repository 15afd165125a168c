use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::{ReceiverConfig, MAX_PACKET_SIZE};
use crate::event_loop::{Event, EventLoop};
use crate::packet_header::{encode_frame, PacketHeader};
use crate::packet_trace;
use crate::reassembly::{Insertion, ReassemblyBuffer};
use crate::send_pipeline::SendPipeline;
use crate::seq::SeqNumber;

/// How one client session ended.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Orderly teardown; the transferred bytes were materialized.
    Completed,
    /// The client fell silent; whatever contiguous data arrived was kept.
    Abandoned,
    /// A termination signal arrived.
    Interrupted,
}

/// How the data phase handed over to the next stage.
enum DataEnd {
    Fin(PacketHeader),
    DeadPeer,
    Interrupted,
}

/// The last cumulative-ACK frame sent to the client, kept around verbatim:
///  duplicates, reordered arrivals and the retransmission timer all re-send
///  exactly this frame.
struct LatestAck {
    header: PacketHeader,
    frame: Bytes,
}

/// The receiving endpoint: accepts one client at a time, reassembles its
///  byte stream and materializes it as `<client_id>.file`.
pub struct Receiver {
    config: ReceiverConfig,
    send_pipeline: SendPipeline,
    event_loop: EventLoop,
    client_id: u64,
}

impl Receiver {
    pub async fn new(config: ReceiverConfig) -> anyhow::Result<Receiver> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(config.bind_addr).await?);
        info!("bound receive socket to {:?}", socket.local_addr()?);

        let event_loop = EventLoop::new(
            socket.clone(),
            config.retransmission_timeout,
            config.dead_peer_timeout,
        )?;

        Ok(Receiver {
            config,
            send_pipeline: SendPipeline::new(Arc::new(socket)),
            event_loop,
            client_id: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.send_pipeline.local_addr()
    }

    /// Serve clients sequentially until a termination signal arrives.
    pub async fn serve(&mut self) -> anyhow::Result<()> {
        loop {
            match self.serve_one_session().await? {
                SessionEnd::Completed | SessionEnd::Abandoned => {}
                SessionEnd::Interrupted => {
                    self.write_interrupt_marker().await?;
                    info!("caught termination signal, exiting");
                    return Ok(());
                }
            }
        }
    }

    /// One full session: accept a SYN, run the data phase, tear down,
    ///  materialize. Increments the client id even when the session is
    ///  abandoned half-way.
    pub async fn serve_one_session(&mut self) -> anyhow::Result<SessionEnd> {
        self.client_id += 1;
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        self.event_loop.disarm_retransmission();
        self.event_loop.disarm_dead_peer();

        let (client_addr, syn_header) = match self.accept(&mut buf).await {
            Step::Proceed(accepted) => accepted,
            Step::Interrupted => return Ok(SessionEnd::Interrupted),
        };
        info!(
            "session {}: serving client {:?}",
            self.client_id, client_addr
        );

        // answer with SYN|ACK carrying our own random initial sequence
        let mut seq_number = SeqNumber::random();
        let expect_seq = syn_header.seq_number.next();
        let syn_ack = PacketHeader::syn_ack(seq_number, expect_seq);
        let syn_ack_frame = encode_frame(&syn_ack, &[]);
        self.send_pipeline
            .do_send_packet(client_addr, &syn_ack_frame)
            .await;
        packet_trace::log_send(&syn_ack, 0, 0, false);
        seq_number = seq_number.next();

        let mut buffer = ReassemblyBuffer::new(expect_seq);
        let mut latest_ack = LatestAck {
            header: syn_ack,
            frame: syn_ack_frame,
        };

        match self
            .run_data_phase(client_addr, &mut buffer, seq_number, &mut latest_ack, &mut buf)
            .await
        {
            DataEnd::Fin(fin_header) => {
                if let Step::Interrupted = self
                    .teardown(client_addr, &fin_header, seq_number, &mut buf)
                    .await
                {
                    return Ok(SessionEnd::Interrupted);
                }
                self.materialize(&buffer).await?;
                Ok(SessionEnd::Completed)
            }
            DataEnd::DeadPeer => {
                warn!(
                    "session {}: client silent for {:?} - abandoning",
                    self.client_id, self.config.dead_peer_timeout
                );
                // keep what arrived; the next session starts fresh
                self.materialize(&buffer).await?;
                Ok(SessionEnd::Abandoned)
            }
            DataEnd::Interrupted => Ok(SessionEnd::Interrupted),
        }
    }

    /// Block until a SYN arrives; everything else is logged and discarded.
    async fn accept(&mut self, buf: &mut [u8]) -> Step<(SocketAddr, PacketHeader)> {
        loop {
            match self.event_loop.next(buf).await {
                Event::Datagram { len, from } => match PacketHeader::deser(&mut &buf[..len]) {
                    Ok(header) if header.syn => {
                        packet_trace::log_recv(&header, 0, 0);
                        return Step::Proceed((from, header));
                    }
                    Ok(header) => {
                        packet_trace::log_recv(&header, 0, 0);
                        warn!("expected a SYN packet - dropping");
                    }
                    Err(e) => warn!("dropping malformed datagram from {:?}: {}", from, e),
                },
                Event::RetransTimer | Event::DeadPeerTimer => {
                    debug!("stale timer event while waiting for a SYN");
                }
                Event::Termination => return Step::Interrupted,
            }
        }
    }

    /// Feed arriving data frames into the reassembly buffer until the client
    ///  sends its FIN.
    async fn run_data_phase(
        &mut self,
        client_addr: SocketAddr,
        buffer: &mut ReassemblyBuffer,
        seq_number: SeqNumber,
        latest_ack: &mut LatestAck,
        buf: &mut [u8],
    ) -> DataEnd {
        self.event_loop.arm_dead_peer();

        loop {
            // the retransmission timer acts as an idle timer here: it only
            // expires after half a second without any datagram
            self.event_loop.arm_retransmission();

            match self.event_loop.next(buf).await {
                Event::Datagram { len, from } => {
                    let Some(header) = decode_from(&buf[..len], from, client_addr) else {
                        continue;
                    };
                    packet_trace::log_recv(&header, 0, 0);

                    if header.ack {
                        let payload =
                            Bytes::copy_from_slice(&buf[PacketHeader::SERIALIZED_LEN..len]);
                        match buffer.insert(header, payload) {
                            Insertion::InOrder { ack_number } => {
                                let ack = PacketHeader::ack(seq_number, ack_number);
                                let frame = encode_frame(&ack, &[]);
                                self.send_pipeline.do_send_packet(client_addr, &frame).await;
                                packet_trace::log_send(&ack, 0, 0, false);
                                *latest_ack = LatestAck { header: ack, frame };
                            }
                            Insertion::OutOfOrder | Insertion::Behind => {
                                self.resend_latest_ack(client_addr, latest_ack).await;
                            }
                        }
                    } else if header.fin {
                        return DataEnd::Fin(header);
                    } else {
                        warn!("expected an ACK or FIN packet - dropping");
                    }
                    self.event_loop.arm_dead_peer();
                }
                Event::RetransTimer => {
                    self.resend_latest_ack(client_addr, latest_ack).await;
                }
                Event::DeadPeerTimer => return DataEnd::DeadPeer,
                Event::Termination => return DataEnd::Interrupted,
            }
        }
    }

    /// Answer the FIN with FIN|ACK and wait for the closing ACK, re-sending
    ///  on the retransmission timer and force-closing on the dead-peer timer.
    async fn teardown(
        &mut self,
        client_addr: SocketAddr,
        fin_header: &PacketHeader,
        seq_number: SeqNumber,
        buf: &mut [u8],
    ) -> Step<()> {
        let fin_ack = PacketHeader::fin_ack(seq_number, fin_header.seq_number.next());
        let fin_ack_frame = encode_frame(&fin_ack, &[]);
        self.send_pipeline
            .do_send_packet(client_addr, &fin_ack_frame)
            .await;
        packet_trace::log_send(&fin_ack, 0, 0, false);

        // the closing ACK must acknowledge the FIN|ACK we just sent
        let expect_ack = seq_number.next();

        self.event_loop.arm_dead_peer();
        loop {
            self.event_loop.arm_retransmission();

            match self.event_loop.next(buf).await {
                Event::Datagram { len, from } => {
                    let Some(header) = decode_from(&buf[..len], from, client_addr) else {
                        continue;
                    };
                    packet_trace::log_recv(&header, 0, 0);

                    if header.ack && header.ack_number == expect_ack {
                        return Step::Proceed(());
                    }
                    self.event_loop.arm_dead_peer();
                }
                Event::RetransTimer => {
                    self.send_pipeline
                        .do_send_packet(client_addr, &fin_ack_frame)
                        .await;
                    packet_trace::log_send(&fin_ack, 0, 0, false);
                }
                Event::DeadPeerTimer => {
                    warn!("client never acknowledged the FIN|ACK - force closing");
                    return Step::Proceed(());
                }
                Event::Termination => return Step::Interrupted,
            }
        }
    }

    async fn resend_latest_ack(&self, client_addr: SocketAddr, latest_ack: &LatestAck) {
        self.send_pipeline
            .do_send_packet(client_addr, &latest_ack.frame)
            .await;
        packet_trace::log_send(&latest_ack.header, 0, 0, true);
    }

    /// Concatenate the buffered payloads and write `<client_id>.file`.
    async fn materialize(&self, buffer: &ReassemblyBuffer) -> anyhow::Result<()> {
        let path = self.output_path();
        let content = buffer.assemble();
        tokio::fs::write(&path, &content)
            .await
            .with_context(|| format!("cannot write output file {:?}", path))?;
        info!(
            "session {}: wrote {} bytes to {:?}",
            self.client_id,
            content.len(),
            path
        );
        Ok(())
    }

    async fn write_interrupt_marker(&self) -> anyhow::Result<()> {
        let path = self.output_path();
        tokio::fs::write(&path, b"INTERRUPT")
            .await
            .with_context(|| format!("cannot write output file {:?}", path))
    }

    fn output_path(&self) -> PathBuf {
        self.config.output_dir.join(format!("{}.file", self.client_id))
    }
}

enum Step<T> {
    Proceed(T),
    Interrupted,
}

/// Decode a datagram, dropping (with a log line) anything malformed or not
///  sent by the session's client.
fn decode_from(datagram: &[u8], from: SocketAddr, client_addr: SocketAddr) -> Option<PacketHeader> {
    if from != client_addr {
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

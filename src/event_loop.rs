use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::time::{sleep, Instant, Sleep};
use tracing::error;

/// The one event an endpoint iteration reacts to.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// A datagram of `len` bytes was read into the caller's buffer.
    Datagram { len: usize, from: SocketAddr },
    /// The single-shot retransmission timer expired.
    RetransTimer,
    /// The peer has been silent for the whole dead-peer interval.
    DeadPeerTimer,
    /// SIGINT, SIGQUIT or SIGTERM.
    Termination,
}

/// A single-shot timer that never fires while disarmed and stays quiescent
///  after firing until it is armed again.
struct SingleShotTimer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl SingleShotTimer {
    fn new() -> SingleShotTimer {
        SingleShotTimer {
            sleep: Box::pin(sleep(Duration::ZERO)),
            armed: false,
        }
    }

    fn arm(&mut self, after: Duration) {
        self.sleep.as_mut().reset(Instant::now() + after);
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

/// The endpoints' single suspension point: one blocking wait across the
///  socket, the retransmission timer, the dead-peer timer and the POSIX
///  termination signals, yielding exactly one [Event] per call.
///
/// When several sources are ready simultaneously, the socket wins over the
///  retransmission timer, which wins over the dead-peer timer, which wins
///  over a pending signal.
pub struct EventLoop {
    socket: Arc<UdpSocket>,
    retransmission_timeout: Duration,
    dead_peer_timeout: Duration,
    retrans_timer: SingleShotTimer,
    dead_peer_timer: SingleShotTimer,
    sigint: Signal,
    sigquit: Signal,
    sigterm: Signal,
}

impl EventLoop {
    pub fn new(
        socket: Arc<UdpSocket>,
        retransmission_timeout: Duration,
        dead_peer_timeout: Duration,
    ) -> anyhow::Result<EventLoop> {
        Ok(EventLoop {
            socket,
            retransmission_timeout,
            dead_peer_timeout,
            retrans_timer: SingleShotTimer::new(),
            dead_peer_timer: SingleShotTimer::new(),
            sigint: signal(SignalKind::interrupt())?,
            sigquit: signal(SignalKind::quit())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// (Re-)arm the retransmission timer for the configured 500 ms.
    pub fn arm_retransmission(&mut self) {
        self.retrans_timer.arm(self.retransmission_timeout);
    }

    /// Arm the retransmission timer slot for a one-off duration. The teardown
    ///  linger reuses this slot instead of carrying a fifth event source.
    pub fn arm_retransmission_for(&mut self, after: Duration) {
        self.retrans_timer.arm(after);
    }

    pub fn disarm_retransmission(&mut self) {
        self.retrans_timer.disarm();
    }

    pub fn arm_dead_peer(&mut self) {
        self.dead_peer_timer.arm(self.dead_peer_timeout);
    }

    pub fn disarm_dead_peer(&mut self) {
        self.dead_peer_timer.disarm();
    }

    /// Wait for the next event, reading a ready datagram into `buf`.
    ///
    /// Transient socket receive errors are logged and absorbed here - the
    ///  retransmission machinery recovers from the lost datagram.
    pub async fn next(&mut self, buf: &mut [u8]) -> Event {
        loop {
            tokio::select! {
                biased;

                received = self.socket.recv_from(buf) => {
                    match received {
                        Ok((len, from)) => return Event::Datagram { len, from },
                        Err(e) => {
                            error!("socket receive error: {}", e);
                            continue;
                        }
                    }
                }
                _ = self.retrans_timer.sleep.as_mut(), if self.retrans_timer.armed => {
                    self.retrans_timer.armed = false;
                    return Event::RetransTimer;
                }
                _ = self.dead_peer_timer.sleep.as_mut(), if self.dead_peer_timer.armed => {
                    self.dead_peer_timer.armed = false;
                    return Event::DeadPeerTimer;
                }
                _ = self.sigint.recv() => return Event::Termination,
                _ = self.sigquit.recv() => return Event::Termination,
                _ = self.sigterm.recv() => return Event::Termination,
            }
        }
    }
}

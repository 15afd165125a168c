use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::net::UdpSocket;
use tracing::{error, trace};

/// This is an abstraction for sending a datagram on a UDP socket, introduced
///  to facilitate mocking the I/O part away for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SendSocket: Send + Sync + 'static {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]);

    fn local_addr(&self) -> SocketAddr;
}

#[async_trait]
impl SendSocket for Arc<UdpSocket> {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) {
        trace!("UDP socket: sending {} bytes to {:?}", packet_buf.len(), to);

        // a failed send is transient: the retransmission machinery recovers
        if let Err(e) = self.send_to(packet_buf, to).await {
            error!("error sending UDP packet to {:?}: {}", to, e);
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.as_ref()
            .local_addr()
            .expect("UdpSocket should have an initialized local addr")
    }
}

#[derive(Clone)]
pub struct SendPipeline {
    socket: Arc<dyn SendSocket>,
}

impl SendPipeline {
    pub fn new(socket: Arc<dyn SendSocket>) -> SendPipeline {
        SendPipeline { socket }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) {
        self.socket.do_send_packet(to, packet_buf).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_header::{encode_frame, PacketHeader};
    use crate::seq::SeqNumber;

    #[tokio::test]
    async fn test_pipeline_forwards_exact_frame_bytes() {
        let to = SocketAddr::from(([127, 0, 0, 1], 9));
        let frame = encode_frame(
            &PacketHeader::syn_ack(SeqNumber::from_raw(3), SeqNumber::from_raw(8)),
            &[],
        );
        let expected: Vec<u8> = vec![3, 0, 8, 0, 1, 1, 0, 0, 0, 0, 0, 0];
        assert_eq!(frame.as_ref(), expected.as_slice());

        let mut send_socket = MockSendSocket::new();
        send_socket
            .expect_do_send_packet()
            .once()
            .withf(move |addr, buf| addr == &to && buf == expected.as_slice())
            .returning(|_, _| ());

        let pipeline = SendPipeline::new(Arc::new(send_socket));
        pipeline.do_send_packet(to, &frame).await;
    }

    #[tokio::test]
    async fn test_data_frame_carries_payload_after_header() {
        let to = SocketAddr::from(([127, 0, 0, 1], 9));
        let frame = encode_frame(
            &PacketHeader::ack(SeqNumber::from_raw(512), SeqNumber::from_raw(100)),
            b"abc",
        );
        let expected: Vec<u8> = vec![0, 2, 100, 0, 1, 0, 0, 0, 0, 0, 0, 0, b'a', b'b', b'c'];

        let mut send_socket = MockSendSocket::new();
        send_socket
            .expect_do_send_packet()
            .once()
            .withf(move |addr, buf| addr == &to && buf == expected.as_slice())
            .returning(|_, _| ());

        let pipeline = SendPipeline::new(Arc::new(send_socket));
        pipeline.do_send_packet(to, &frame).await;
    }
}

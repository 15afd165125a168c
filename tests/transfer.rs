//! End-to-end transfers over loopback UDP: a real receiver task, a real
//!  sender, real timers, byte-for-byte comparison of the materialized file.

use std::path::PathBuf;

use ruft::config::{ReceiverConfig, SenderConfig};
use ruft::receiver::{Receiver, SessionEnd};
use ruft::sender::{Sender, TransferOutcome};

fn test_output_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ruft-{}-{}", tag, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Run one full session against a freshly bound receiver and return the
///  materialized file contents.
async fn transfer(message: Vec<u8>, tag: &str) -> Vec<u8> {
    let dir = test_output_dir(tag);

    let mut config = ReceiverConfig::new("127.0.0.1:0".parse().unwrap());
    config.output_dir = dir.clone();
    let mut receiver = Receiver::new(config).await.unwrap();
    let peer_addr = receiver.local_addr();

    let receiver_task = tokio::spawn(async move { receiver.serve_one_session().await });

    let mut sender = Sender::new(SenderConfig::new(peer_addr)).await.unwrap();
    let outcome = sender.send_message(&message).await.unwrap();
    assert_eq!(outcome, TransferOutcome::Completed);

    let session_end = receiver_task.await.unwrap().unwrap();
    assert_eq!(session_end, SessionEnd::Completed);

    std::fs::read(dir.join("1.file")).unwrap()
}

#[tokio::test]
async fn test_single_byte_file() {
    assert_eq!(transfer(vec![0x41], "single-byte").await, vec![0x41]);
}

#[tokio::test]
async fn test_multi_frame_file() {
    // 512 + 512 + 512 + 464
    let message = patterned(2000);
    assert_eq!(transfer(message.clone(), "multi-frame").await, message);
}

#[tokio::test]
async fn test_empty_file() {
    assert_eq!(transfer(Vec::new(), "empty").await, Vec::<u8>::new());
}

#[tokio::test]
async fn test_transfer_across_sequence_wrap() {
    // more payload bytes than the sequence space has numbers
    let message = patterned(26112);
    assert_eq!(transfer(message.clone(), "seq-wrap").await, message);
}

/// A forwarding hop that drops the second data frame on its first attempt.
///  The receiver then sees a gap, answers with duplicate ACKs, and the sender
///  has to retransmit before the transfer can complete.
async fn run_lossy_proxy(
    client_facing: tokio::net::UdpSocket,
    receiver_addr: std::net::SocketAddr,
) {
    let server_facing = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut from_client = [0u8; 1024];
    let mut from_server = [0u8; 1024];
    let mut sender_addr = None;
    let mut data_frames_seen = 0;
    let mut dropped = false;

    loop {
        tokio::select! {
            received = client_facing.recv_from(&mut from_client) => {
                let (len, from) = received.unwrap();
                sender_addr = Some(from);
                if len > 12 {
                    data_frames_seen += 1;
                    if data_frames_seen == 2 && !dropped {
                        dropped = true;
                        continue;
                    }
                }
                server_facing.send_to(&from_client[..len], receiver_addr).await.unwrap();
            }
            received = server_facing.recv_from(&mut from_server) => {
                let (len, _) = received.unwrap();
                if let Some(addr) = sender_addr {
                    client_facing.send_to(&from_server[..len], addr).await.unwrap();
                }
            }
        }
    }
}

#[tokio::test]
async fn test_dropped_frame_is_retransmitted() {
    let dir = test_output_dir("lossy");

    let mut config = ReceiverConfig::new("127.0.0.1:0".parse().unwrap());
    config.output_dir = dir.clone();
    let mut receiver = Receiver::new(config).await.unwrap();
    let receiver_addr = receiver.local_addr();

    let receiver_task = tokio::spawn(async move { receiver.serve_one_session().await });

    let proxy_socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_socket.local_addr().unwrap();
    tokio::spawn(run_lossy_proxy(proxy_socket, receiver_addr));

    let message = patterned(2000);
    let mut sender = Sender::new(SenderConfig::new(proxy_addr)).await.unwrap();
    assert_eq!(
        sender.send_message(&message).await.unwrap(),
        TransferOutcome::Completed
    );

    let session_end = receiver_task.await.unwrap().unwrap();
    assert_eq!(session_end, SessionEnd::Completed);
    assert_eq!(std::fs::read(dir.join("1.file")).unwrap(), message);
}

#[tokio::test]
async fn test_two_sequential_clients() {
    let dir = test_output_dir("two-clients");

    let mut config = ReceiverConfig::new("127.0.0.1:0".parse().unwrap());
    config.output_dir = dir.clone();
    let mut receiver = Receiver::new(config).await.unwrap();
    let peer_addr = receiver.local_addr();

    let receiver_task = tokio::spawn(async move {
        let first = receiver.serve_one_session().await.unwrap();
        let second = receiver.serve_one_session().await.unwrap();
        (first, second)
    });

    let first_message = patterned(700);
    let second_message = patterned(3000);

    let mut sender = Sender::new(SenderConfig::new(peer_addr)).await.unwrap();
    assert_eq!(
        sender.send_message(&first_message).await.unwrap(),
        TransferOutcome::Completed
    );

    let mut sender = Sender::new(SenderConfig::new(peer_addr)).await.unwrap();
    assert_eq!(
        sender.send_message(&second_message).await.unwrap(),
        TransferOutcome::Completed
    );

    let (first_end, second_end) = receiver_task.await.unwrap();
    assert_eq!(first_end, SessionEnd::Completed);
    assert_eq!(second_end, SessionEnd::Completed);

    assert_eq!(std::fs::read(dir.join("1.file")).unwrap(), first_message);
    assert_eq!(std::fs::read(dir.join("2.file")).unwrap(), second_message);
}

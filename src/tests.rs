//! Crate-level integration tests.
//!
//! Unlike the per-module unit tests, these exercise real sockets end to
//! end: a CPX client or streamer connects to a small hand-rolled "device"
//! task speaking the wire protocol directly, the way the real vision MCU
//! would. This is the cheapest way to catch a framing mismatch between
//! `frame.rs`, `codec.rs`, `transport/*` and `client`/`streamer` that a
//! module's own unit tests, each mocking its neighbors, would miss.

use crate::client::{CpxClient, CpxClientOptions, CpxError};
use crate::codec::{DatagramHeader, Encodable, ReliableHeader};
use crate::frame::{CpxFunction, CpxHeader, CpxPacket, CpxTarget};
use crate::streamer::{PixelGrid, Streamer, StreamerMetadata, METADATA_VERSION};
use crate::transport::{TransportEvent, UnreliableTransport};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

async fn send_cpx_frame(socket: &mut TcpStream, header: CpxHeader, payload: &[u8]) {
    let frame_header = ReliableHeader::new(payload.len() as u16, header);
    let mut frame = frame_header.to_bytes();
    frame.extend_from_slice(payload);
    socket.write_all(&frame).await.unwrap();
}

fn sample_metadata_bytes(width: u16, height: u16, bpp: u8, frame_id: u8) -> Vec<u8> {
    let mut buf = vec![0u8; StreamerMetadata::SIZE];
    buf[0] = METADATA_VERSION;
    buf[1..3].copy_from_slice(&width.to_le_bytes());
    buf[3..5].copy_from_slice(&height.to_le_bytes());
    buf[5] = bpp;
    buf[6] = 0;
    buf[7] = frame_id;
    buf
}

#[tokio::test]
async fn client_round_trips_a_packet_over_the_reliable_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let header = CpxHeader::new(CpxTarget::FlightController, CpxFunction::System);
        send_cpx_frame(&mut socket, header, &[9, 8, 7]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let client = CpxClient::connect(CpxClientOptions::new("127.0.0.1", port));
    let packet = tokio::time::timeout(Duration::from_secs(2), client.receive())
        .await
        .expect("receive timed out")
        .expect("receive failed");

    assert_eq!(packet.header.function, CpxFunction::System);
    assert_eq!(packet.payload, vec![9, 8, 7]);

    server.await.unwrap();
    client.shutdown().await;
}

#[tokio::test]
async fn client_receive_is_fatal_on_unsupported_version() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let header = CpxHeader::new(CpxTarget::FlightController, CpxFunction::System);
        let mut bytes = header.encode();
        bytes[1] |= 0b0100_0000; // stamp version = 1, which this client rejects
        let mut frame = Vec::new();
        frame.extend_from_slice(&1u16.to_le_bytes());
        frame.extend_from_slice(&bytes);
        frame.push(0xAA);
        socket.write_all(&frame).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let client = CpxClient::connect(CpxClientOptions::new("127.0.0.1", port));
    let err = tokio::time::timeout(Duration::from_secs(2), client.receive())
        .await
        .expect("receive timed out")
        .unwrap_err();
    assert!(matches!(err, CpxError::UnsupportedVersion(1)));

    server.await.unwrap();
    client.shutdown().await;
}

#[tokio::test]
async fn unreliable_transport_resyncs_after_out_of_order_datagram() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_port = server.local_addr().unwrap().port();

    let transport = UnreliableTransport::new("127.0.0.1", server_port);
    transport.connect(0).await.unwrap();

    let header = CpxHeader::new(CpxTarget::VisionMcu, CpxFunction::Streamer);
    let probe = CpxPacket::new(header, vec![0]);
    transport.send(&probe).await.unwrap();

    let mut buf = [0u8; 64];
    let (_, client_addr) = server.recv_from(&mut buf).await.unwrap();

    for seq in [5u16, 6, 4, 7] {
        let mut frame = DatagramHeader::new(seq, header).to_bytes();
        frame.extend_from_slice(&[seq as u8]);
        server.send_to(&frame, client_addr).await.unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(1), transport.recv()).await;
        match event {
            Ok(Some(TransportEvent::Packet(packet))) => received.push(packet.payload[0]),
            _ => break,
        }
    }

    // 5 and 6 arrive in order; 4 regresses and is discarded with a resync;
    // 7 is then accepted against the resynced expectation.
    assert_eq!(received, vec![5, 6, 7]);
    transport.shutdown().await;
}

#[tokio::test]
async fn streamer_happy_path_reassembles_image_buffer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut image = sample_metadata_bytes(8, 6, 1, 11);
    image.extend(std::iter::repeat_n(0x42u8, 8 * 6));
    let checksum = crc32fast::hash(&image);

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let cpx_header = CpxHeader::new(CpxTarget::WifiHost, CpxFunction::Streamer);

        let mid = image.len() / 2;
        let (first, rest) = image.split_at(mid);

        let mut begin_payload = vec![0x10u8, 0x01];
        begin_payload.extend_from_slice(&(image.len() as u32).to_le_bytes());
        begin_payload.extend_from_slice(&checksum.to_le_bytes());
        begin_payload.extend_from_slice(&[0, 0]);
        begin_payload.extend_from_slice(first);
        send_cpx_frame(&mut socket, cpx_header, &begin_payload).await;

        let mut data_payload = vec![0x11u8, 0, 0, 0];
        data_payload.extend_from_slice(rest);
        send_cpx_frame(&mut socket, cpx_header, &data_payload).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let streamer = Streamer::connect("127.0.0.1", port).await.unwrap();
    let (grid, tof, metadata) = tokio::time::timeout(Duration::from_secs(2), streamer.receive())
        .await
        .expect("receive timed out")
        .expect("streamer error")
        .expect("stream ended unexpectedly");

    assert_eq!(metadata.frame_id, 11);
    assert!(tof.is_none());
    match grid {
        PixelGrid::U8(array) => assert_eq!(array.shape(), &[6, 8]),
        _ => panic!("expected an 8bpp pixel grid"),
    }

    server.await.unwrap();
    streamer.shutdown().await;
}

#[tokio::test]
async fn streamer_discards_corrupted_buffer_then_recovers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let good_image = {
        let mut buf = sample_metadata_bytes(4, 4, 1, 3);
        buf.extend(std::iter::repeat_n(0x7u8, 16));
        buf
    };
    let good_checksum = crc32fast::hash(&good_image);

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let cpx_header = CpxHeader::new(CpxTarget::WifiHost, CpxFunction::Streamer);

        // A corrupted buffer: checksum doesn't match the (single-segment) payload.
        let mut corrupt_payload = vec![0x10u8, 0x01];
        corrupt_payload.extend_from_slice(&(good_image.len() as u32).to_le_bytes());
        corrupt_payload.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        corrupt_payload.extend_from_slice(&[0, 0]);
        corrupt_payload.extend_from_slice(&good_image);
        send_cpx_frame(&mut socket, cpx_header, &corrupt_payload).await;

        // A subsequent, correctly checksummed buffer.
        let mut good_payload = vec![0x10u8, 0x01];
        good_payload.extend_from_slice(&(good_image.len() as u32).to_le_bytes());
        good_payload.extend_from_slice(&good_checksum.to_le_bytes());
        good_payload.extend_from_slice(&[0, 0]);
        good_payload.extend_from_slice(&good_image);
        send_cpx_frame(&mut socket, cpx_header, &good_payload).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let streamer = Streamer::connect("127.0.0.1", port).await.unwrap();
    let (_, _, metadata) = tokio::time::timeout(Duration::from_secs(2), streamer.receive())
        .await
        .expect("receive timed out")
        .expect("streamer error")
        .expect("stream ended unexpectedly");

    // Only the second (valid) buffer should ever be emitted.
    assert_eq!(metadata.frame_id, 3);

    server.await.unwrap();
    streamer.shutdown().await;
}

// ABOUTME: Replays a captured image buffer to a connecting receiver, standing in for real hardware
// ABOUTME: Pairs with cpx-receiver for testing consumer code without an AI-deck attached

use cpx::codec::{encode_u32, encode_u8, Encodable, ReliableHeader};
use cpx::{CpxFunction, CpxHeader, CpxTarget};
use std::error::Error;
use std::fs;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

const CMD_BEGIN: u8 = 0x10;
const CMD_DATA: u8 = 0x11;
const BUFFER_TYPE_IMAGE: u8 = 0x01;
const SEGMENT_SIZE: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().expect("usage: cpx-replay <path> [port] [fps]");
    let port: u16 = args.next().and_then(|s| s.parse().ok()).unwrap_or(5000);
    let fps: f64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(10.0);

    let buffer = fs::read(&path)?;
    println!("loaded {} bytes from {path}, waiting for a receiver on :{port}", buffer.len());

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let (mut socket, peer) = listener.accept().await?;
    println!("receiver connected from {peer}");

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
    let header = CpxHeader::new(CpxTarget::WifiHost, CpxFunction::Streamer);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = send_buffer(&mut socket, header, &buffer).await {
                    eprintln!("failed to send replay buffer, receiver likely disconnected: {err}");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("received interrupt, shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Segment `buffer` into BEGIN/DATA frames exactly as `Streamer::send_buffer`
/// does, but from the accepting side: this binary plays the part of the
/// vision MCU, which this crate otherwise never needs to be.
async fn send_buffer(
    socket: &mut tokio::net::TcpStream,
    header: CpxHeader,
    buffer: &[u8],
) -> std::io::Result<()> {
    let raw_checksum = crc32fast::hash(buffer);
    let checksum = if raw_checksum == 0 { 0xFFFF_FFFF } else { raw_checksum };

    let mut sent = 0usize;
    let mut first = true;
    while sent < buffer.len() || first {
        let end = (sent + SEGMENT_SIZE).min(buffer.len());
        let segment = &buffer[sent..end];

        let mut payload = bytes::BytesMut::new();
        if first {
            payload.extend_from_slice(&[CMD_BEGIN]);
            encode_u8(&mut payload, BUFFER_TYPE_IMAGE);
            encode_u32(&mut payload, buffer.len() as u32);
            encode_u32(&mut payload, checksum);
            payload.extend_from_slice(&[0, 0]);
        } else {
            payload.extend_from_slice(&[CMD_DATA, 0, 0, 0]);
        }
        payload.extend_from_slice(segment);

        let frame_header = ReliableHeader::new(payload.len() as u16, header);
        let mut frame = frame_header.to_bytes();
        frame.extend_from_slice(&payload);
        socket.write_all(&frame).await?;

        sent = end;
        first = false;
    }

    Ok(())
}

// ABOUTME: Loopback demo for the raw CPX client, no streamer framing involved
// ABOUTME: Spins up a tiny in-process "device" socket and exchanges a handful of frames with it

//! # CPX frame loopback
//!
//! Binds a local TCP listener standing in for the vision MCU, connects a
//! [`CpxClient`] to it, and exchanges a few frames in both directions. Useful
//! as a smoke test when wiring up a new transport or observer callback
//! without a real AI-deck attached.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example loopback_frame -- --count 5
//! ```

use argh::FromArgs;
use cpx::codec::{Encodable, ReliableHeader};
use cpx::{CpxClient, CpxClientOptions, CpxFunction, CpxHeader, CpxPacket, CpxTarget};
use std::error::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Exchange a handful of CPX frames with a loopback "device".
#[derive(FromArgs)]
struct CliArgs {
    /// whether to enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// number of frames the device sends (default: 3)
    #[argh(option, short = 'c')]
    count: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let count = cli_args.count.unwrap_or(3);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    info!(port, "loopback device listening");

    let device = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("device accept failed");
        let header = CpxHeader::new(CpxTarget::VisionMcu, CpxFunction::System);

        for i in 0..count {
            let payload = vec![i as u8];
            let frame_header = ReliableHeader::new(payload.len() as u16, header);
            let mut frame = frame_header.to_bytes();
            frame.extend_from_slice(&payload);
            socket.write_all(&frame).await.expect("device write failed");
        }

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    });

    let client = CpxClient::connect(CpxClientOptions::new("127.0.0.1", port));
    client.set_observer(|packet| {
        info!(function = ?packet.header.function, len = packet.payload.len(), "observed packet");
    });

    let mut request_header = CpxHeader::new(CpxTarget::VisionMcu, CpxFunction::System);
    request_header.last_packet = true;
    client.send(&CpxPacket::new(request_header, vec![0xAA])).await?;

    for _ in 0..count {
        let packet = client.receive().await?;
        info!(payload = ?packet.payload, "received frame");
    }

    device.await?;
    client.shutdown().await;
    Ok(())
}

// ABOUTME: Decodes a captured streamer image buffer and prints its metadata fields
// ABOUTME: Useful for inspecting a buffer saved from a real AI-deck session without wiring up a socket

//! # Streamer metadata dump
//!
//! Reads a raw image buffer (metadata prefix followed by pixel bytes, as
//! reassembled by [`cpx::streamer::Streamer`]) from disk and prints the
//! decoded metadata. Pixel data itself is not printed, only its length.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example decode_metadata -- --path capture.bin
//! ```

use argh::FromArgs;
use cpx::streamer::StreamerMetadata;
use std::error::Error;
use std::fs;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Decode and print the metadata prefix of a captured streamer buffer.
#[derive(FromArgs)]
struct CliArgs {
    /// whether to enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// path to the captured buffer
    #[argh(option, short = 'p')]
    path: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let buffer = fs::read(&cli_args.path)?;
    let metadata = StreamerMetadata::decode(&buffer)?;

    info!(
        version = metadata.metadata_version,
        width = metadata.frame_width,
        height = metadata.frame_height,
        bpp = metadata.frame_bpp,
        frame_id = metadata.frame_id,
        frame_timestamp = metadata.frame_timestamp,
        "decoded image metadata"
    );

    let pixel_len = buffer.len().saturating_sub(StreamerMetadata::SIZE);
    info!(pixel_len, "trailing pixel bytes");

    if let Some(side) = metadata.tof.grid_side() {
        info!(side, "time-of-flight grid present");
    } else {
        info!("no time-of-flight data in this frame");
    }

    Ok(())
}

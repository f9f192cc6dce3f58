// ABOUTME: BEGIN/DATA buffer segmentation and reassembly on top of a CpxClient
// ABOUTME: Owns the AWAIT_BEGIN/AWAIT_DATA state machine and dispatches reassembled image buffers into typed grids

use super::metadata::{BufferType, MetadataError, StreamerMetadata};
use super::reply::OffboardBuffer;
use crate::client::{CpxClient, CpxClientOptions, CpxError};
use crate::codec::{decode_u32, decode_u8, encode_u32, encode_u8, skip, CodecError};
use crate::frame::{CpxFunction, CpxHeader, CpxPacket, CpxTarget};
use bytes::{BufMut, BytesMut};
use ndarray::Array2;
use std::io::Cursor;
use std::sync::Mutex;
use thiserror::Error;

const CMD_BEGIN: u8 = 0x10;
const CMD_DATA: u8 = 0x11;

#[derive(Debug, Error)]
pub enum StreamerError {
    #[error(transparent)]
    Client(#[from] CpxError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error("pixel buffer too short for {width}x{height} at {bpp} bytes/px")]
    TruncatedPixels { width: u16, height: u16, bpp: u8 },

    #[error("unsupported pixel size {0} bytes")]
    UnsupportedBpp(u8),
}

/// A decoded pixel buffer, shaped `(height, width)`. The element width
/// depends on `frame_bpp`; interpreting pixel values (demosaicing, color
/// conversion) is left to the caller.
///
/// `frame_bpp` of 1 or 2 decodes into a typed `u8`/`u16` grid. Any other
/// element size decodes into [`PixelGrid::Other`], a `(height, width * bpp)`
/// grid of raw bytes, `bpp` bytes per pixel, row-major and undecoded.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelGrid {
    U8(Array2<u8>),
    U16(Array2<u16>),
    Other { bpp: u8, data: Array2<u8> },
}

struct BeginHeader {
    buffer_type: u8,
    size: u32,
    checksum: u32,
}

impl BeginHeader {
    const SIZE: usize = 1 + 4 + 4 + 2;

    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let buffer_type = decode_u8(buf)?;
        let size = decode_u32(buf)?;
        let checksum = decode_u32(buf)?;
        skip(buf, 2)?;
        Ok(BeginHeader {
            buffer_type,
            size,
            checksum,
        })
    }
}

const DATA_HEADER_SIZE: usize = 3;

enum ReassemblyState {
    AwaitBegin,
    AwaitData {
        buffer_type: u8,
        remaining: u32,
        checksum: u32,
        buffer: Vec<u8>,
    },
}

/// The application-level buffer protocol layered on top of CPX: fragments
/// arbitrarily sized, checksummed buffers across one BEGIN and zero or
/// more DATA packets and reassembles them on receive.
pub struct Streamer {
    client: CpxClient,
    header: CpxHeader,
    state: Mutex<ReassemblyState>,
}

impl Streamer {
    /// Connect to the vision MCU at `remote_host:remote_port`.
    pub async fn connect(
        remote_host: impl Into<String>,
        remote_port: u16,
    ) -> Result<Self, StreamerError> {
        Ok(Self::with_options(CpxClientOptions::new(
            remote_host,
            remote_port,
        )))
    }

    /// Connect with full control over transport configuration.
    pub fn with_options(options: CpxClientOptions) -> Self {
        let client = CpxClient::connect(options);
        let header = CpxHeader::new(CpxTarget::VisionMcu, CpxFunction::Streamer);
        Self {
            client,
            header,
            state: Mutex::new(ReassemblyState::AwaitBegin),
        }
    }

    /// Register a callback invoked on every CPX packet sent or received.
    pub fn set_observer(&self, observer: impl Fn(&CpxPacket) + Send + Sync + 'static) {
        self.client.set_observer(observer);
    }

    /// Wait for the next fully reassembled image buffer.
    ///
    /// Returns `Ok(None)` once the underlying client has shut down
    /// cleanly. Returns `Err` for a fatal protocol incompatibility (CPX
    /// version mismatch or unsupported metadata version) — the stream
    /// cannot be trusted past that point.
    pub async fn receive(
        &self,
    ) -> Result<Option<(PixelGrid, Option<Array2<u8>>, StreamerMetadata)>, StreamerError> {
        loop {
            let packet = match self.client.receive().await {
                Ok(packet) => packet,
                Err(CpxError::Closed) => return Ok(None),
                Err(err) => return Err(StreamerError::Client(err)),
            };

            if packet.header.function != CpxFunction::Streamer {
                tracing::debug!(function = ?packet.header.function, "not a streamer packet, ignoring");
                continue;
            }

            let Some((buffer_type, buffer)) = self.process_packet(&packet.payload) else {
                continue;
            };

            match BufferType::try_from(buffer_type) {
                Ok(BufferType::Image) => {
                    let (pixels, tof, metadata) = decode_frame(&buffer)?;
                    return Ok(Some((pixels, tof, metadata)));
                }
                _ => {
                    tracing::debug!(buffer_type, "ignoring non-image streamer buffer");
                    continue;
                }
            }
        }
    }

    /// Segment and send `buffer` as a streamer buffer of the given type.
    pub async fn send_buffer(
        &self,
        buffer_type: BufferType,
        buffer: &[u8],
    ) -> Result<(), StreamerError> {
        let raw_checksum = crc32fast::hash(buffer);
        let checksum = if raw_checksum == 0 {
            0xFFFF_FFFF
        } else {
            raw_checksum
        };

        let max_payload = self.client.max_payload_length();
        let begin_capacity = max_payload - 1 - BeginHeader::SIZE;
        let data_capacity = max_payload - 1 - DATA_HEADER_SIZE;

        let mut sent = 0usize;
        let mut first = true;
        loop {
            let capacity = if first { begin_capacity } else { data_capacity };
            let end = (sent + capacity).min(buffer.len());
            let segment = &buffer[sent..end];

            let mut payload = BytesMut::new();
            if first {
                payload.put_u8(CMD_BEGIN);
                encode_u8(&mut payload, buffer_type as u8);
                encode_u32(&mut payload, buffer.len() as u32);
                encode_u32(&mut payload, checksum);
                payload.put_slice(&[0, 0]);
            } else {
                payload.put_u8(CMD_DATA);
                payload.put_slice(&[0, 0, 0]);
            }
            payload.put_slice(segment);

            let packet = CpxPacket::new(self.header, payload.to_vec());
            self.client.send(&packet).await?;

            sent = end;
            first = false;
            if sent >= buffer.len() {
                break;
            }
        }

        Ok(())
    }

    /// Build and send a reply buffer for a received frame's metadata.
    pub async fn send_reply(
        &self,
        metadata: &StreamerMetadata,
        network_output: Option<[f32; 4]>,
    ) -> Result<(), StreamerError> {
        let reply = OffboardBuffer::new(metadata, network_output);
        self.send_buffer(BufferType::Inference, &reply.to_bytes())
            .await
    }

    /// Stop both transports and release their sockets.
    pub async fn shutdown(&self) {
        self.client.shutdown().await;
    }

    /// Advance the reassembly state machine with one streamer packet's
    /// payload. Returns the reassembled `(buffer_type, buffer)` once a
    /// buffer completes and passes checksum validation.
    fn process_packet(&self, payload: &[u8]) -> Option<(u8, Vec<u8>)> {
        let command = *payload.first()?;
        let mut state = self.state.lock().unwrap();
        let expected = match &*state {
            ReassemblyState::AwaitBegin => CMD_BEGIN,
            ReassemblyState::AwaitData { .. } => CMD_DATA,
        };

        if command != expected {
            if command != CMD_BEGIN {
                // DATA with no preceding BEGIN: reset and drop.
                *state = ReassemblyState::AwaitBegin;
                return None;
            }
            // A BEGIN interrupting a partial buffer: drop the partial
            // buffer and reprocess this packet as a fresh BEGIN below,
            // rather than losing the frame it starts.
            *state = ReassemblyState::AwaitBegin;
        }

        if command == CMD_BEGIN {
            if payload.len() < 1 + BeginHeader::SIZE {
                return None;
            }
            let mut cursor = Cursor::new(&payload[1..]);
            let begin = BeginHeader::decode(&mut cursor).ok()?;

            let offset = 1 + BeginHeader::SIZE;
            let slice = &payload[offset..];
            let take = slice.len().min(begin.size as usize);
            let mut buffer = Vec::with_capacity(begin.size as usize);
            buffer.extend_from_slice(&slice[..take]);
            let remaining = begin.size - take as u32;

            return if remaining == 0 {
                *state = ReassemblyState::AwaitBegin;
                Self::finish(begin.buffer_type, begin.checksum, buffer)
            } else {
                *state = ReassemblyState::AwaitData {
                    buffer_type: begin.buffer_type,
                    remaining,
                    checksum: begin.checksum,
                    buffer,
                };
                None
            };
        }

        // command == CMD_DATA, expected == CMD_DATA
        let ReassemblyState::AwaitData {
            buffer_type,
            remaining,
            checksum,
            buffer,
        } = &mut *state
        else {
            unreachable!("state guaranteed AwaitData by the expected-command check above")
        };

        if payload.len() < 1 + DATA_HEADER_SIZE {
            *state = ReassemblyState::AwaitBegin;
            return None;
        }

        let slice = &payload[1 + DATA_HEADER_SIZE..];
        let take = slice.len().min(*remaining as usize);
        buffer.extend_from_slice(&slice[..take]);
        *remaining -= take as u32;

        if *remaining == 0 {
            let buffer_type = *buffer_type;
            let checksum = *checksum;
            let buffer = std::mem::take(buffer);
            *state = ReassemblyState::AwaitBegin;
            Self::finish(buffer_type, checksum, buffer)
        } else {
            None
        }
    }

    fn finish(buffer_type: u8, checksum: u32, buffer: Vec<u8>) -> Option<(u8, Vec<u8>)> {
        if checksum != 0 {
            let actual = crc32fast::hash(&buffer);
            if actual != checksum {
                tracing::warn!(expected = checksum, actual, "streamer buffer failed checksum, discarding");
                return None;
            }
        }
        Some((buffer_type, buffer))
    }
}

fn decode_frame(
    buffer: &[u8],
) -> Result<(PixelGrid, Option<Array2<u8>>, StreamerMetadata), StreamerError> {
    let metadata = StreamerMetadata::decode(buffer)?;
    let pixels = &buffer[StreamerMetadata::SIZE..];

    let (height, width, bpp) = (
        metadata.frame_height as usize,
        metadata.frame_width as usize,
        metadata.frame_bpp,
    );

    let grid = match bpp {
        1 => {
            let bytes = pixels.get(..height * width).ok_or(StreamerError::TruncatedPixels {
                width: metadata.frame_width,
                height: metadata.frame_height,
                bpp,
            })?;
            PixelGrid::U8(Array2::from_shape_vec((height, width), bytes.to_vec())?)
        }
        2 => {
            let bytes = pixels
                .get(..height * width * 2)
                .ok_or(StreamerError::TruncatedPixels {
                    width: metadata.frame_width,
                    height: metadata.frame_height,
                    bpp,
                })?;
            let values: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            PixelGrid::U16(Array2::from_shape_vec((height, width), values)?)
        }
        0 => return Err(StreamerError::UnsupportedBpp(0)),
        other => {
            let stride = other as usize;
            let bytes = pixels.get(..height * width * stride).ok_or(StreamerError::TruncatedPixels {
                width: metadata.frame_width,
                height: metadata.frame_height,
                bpp: other,
            })?;
            PixelGrid::Other {
                bpp: other,
                data: Array2::from_shape_vec((height, width * stride), bytes.to_vec())?,
            }
        }
    };

    let tof = metadata
        .tof
        .grid_side()
        .map(|side| Array2::from_shape_vec((side, side), metadata.tof.samples().to_vec()))
        .transpose()?;

    Ok((grid, tof, metadata))
}

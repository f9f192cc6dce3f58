// ABOUTME: Fixed-layout image metadata and its embedded state/TOF/inference records
// ABOUTME: All little-endian, packed with no inter-field padding, mirroring the onboard ctypes layout

use crate::codec::{decode_bytes, decode_f32, decode_i16, decode_i32, decode_u32, decode_u8, CodecError};
use num_enum::TryFromPrimitive;
use std::io::Cursor;
use thiserror::Error;

/// The only metadata layout version this client understands.
pub const METADATA_VERSION: u8 = 10;

/// Streamer buffer type tag, carried in the BEGIN header.
#[derive(TryFromPrimitive, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BufferType {
    Image = 0x01,
    Inference = 0xF0,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("unsupported metadata version {0}, expected {METADATA_VERSION}")]
    UnsupportedVersion(u8),
}

/// The flight controller's latest state estimate, passed through untouched.
///
/// Quaternion decompression is an external-collaborator concern; `quat`
/// is carried as the raw compressed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateMessage {
    /// Flight-controller tick timestamp.
    pub timestamp: u32,
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub vx: i16,
    pub vy: i16,
    pub vz: i16,
    pub ax: i16,
    pub ay: i16,
    pub az: i16,
    /// Compressed quaternion, elements packed as xyzw. Decompression is
    /// left to the caller.
    pub quat: i32,
    pub rate_roll: i16,
    pub rate_pitch: i16,
    pub rate_yaw: i16,
}

impl StateMessage {
    pub const SIZE: usize = 32;

    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(StateMessage {
            timestamp: decode_u32(buf)?,
            x: decode_i16(buf)?,
            y: decode_i16(buf)?,
            z: decode_i16(buf)?,
            vx: decode_i16(buf)?,
            vy: decode_i16(buf)?,
            vz: decode_i16(buf)?,
            ax: decode_i16(buf)?,
            ay: decode_i16(buf)?,
            az: decode_i16(buf)?,
            quat: decode_i32(buf)?,
            rate_roll: decode_i16(buf)?,
            rate_pitch: decode_i16(buf)?,
            rate_yaw: decode_i16(buf)?,
        })
    }
}

/// The latest distance-sensor (time-of-flight) reading.
///
/// `resolution` is the sample count (0, 16 or 64); `data` always carries
/// 64 bytes on the wire regardless, with only the first `resolution`
/// entries meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TofMessage {
    pub resolution: u8,
    pub data: [u8; 64],
}

impl TofMessage {
    pub const SIZE: usize = 1 + 3 + 64;

    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let resolution = decode_u8(buf)?;
        crate::codec::skip(buf, 3)?;
        let bytes = decode_bytes(buf, 64)?;
        let mut data = [0u8; 64];
        data.copy_from_slice(&bytes);
        Ok(TofMessage { resolution, data })
    }

    /// The square side length of the sample grid, or `None` if no
    /// distance sensor data was reported (`resolution == 0`).
    pub fn grid_side(&self) -> Option<usize> {
        if self.resolution == 0 {
            return None;
        }
        Some((self.resolution as f64).sqrt() as usize)
    }

    /// The valid prefix of `data`, sized by `resolution`.
    pub fn samples(&self) -> &[u8] {
        &self.data[..self.resolution as usize]
    }
}

/// An onboard inference result, stamped with the state timestamp it was
/// computed from. Also used, re-keyed, as the payload of an outbound
/// reply buffer — see [`crate::streamer::reply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InferenceStampedMessage {
    pub stm32_timestamp: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub phi: f32,
}

impl InferenceStampedMessage {
    pub const SIZE: usize = 4 + 4 * 4;

    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(InferenceStampedMessage {
            stm32_timestamp: decode_u32(buf)?,
            x: decode_f32(buf)?,
            y: decode_f32(buf)?,
            z: decode_f32(buf)?,
            phi: decode_f32(buf)?,
        })
    }

    pub(crate) fn encode(&self, buf: &mut bytes::BytesMut) {
        use crate::codec::{encode_f32, encode_u32};
        encode_u32(buf, self.stm32_timestamp);
        encode_f32(buf, self.x);
        encode_f32(buf, self.y);
        encode_f32(buf, self.z);
        encode_f32(buf, self.phi);
    }
}

/// The fixed-layout prefix of every image streamer buffer.
///
/// Immediately followed, in the buffer, by `frame_height * frame_width *
/// frame_bpp` bytes of raw pixel data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamerMetadata {
    pub metadata_version: u8,
    pub frame_width: u16,
    pub frame_height: u16,
    pub frame_bpp: u8,
    pub frame_format: u8,
    /// Hardware frame counter; wraps mod 256.
    pub frame_id: u8,
    pub frame_timestamp: u32,
    pub state_timestamp: u32,
    pub state: StateMessage,
    pub tof_timestamp: u32,
    pub tof: TofMessage,
    pub reply_frame_timestamp: u32,
    pub reply_recv_timestamp: u32,
    pub inference: InferenceStampedMessage,
}

impl StreamerMetadata {
    pub const SIZE: usize = 1 + 2 + 2 + 1 + 1 + 1 + 4 + 4
        + StateMessage::SIZE
        + 4
        + TofMessage::SIZE
        + 4
        + 4
        + InferenceStampedMessage::SIZE;

    /// Parse the metadata prefix from `buf`. Fatal if `metadata_version`
    /// doesn't match [`METADATA_VERSION`] — the rest of the layout cannot
    /// be trusted to line up.
    pub fn decode(buf: &[u8]) -> Result<Self, MetadataError> {
        let mut cursor = Cursor::new(buf);

        let metadata_version = decode_u8(&mut cursor)?;
        if metadata_version != METADATA_VERSION {
            return Err(MetadataError::UnsupportedVersion(metadata_version));
        }

        Ok(StreamerMetadata {
            metadata_version,
            frame_width: crate::codec::decode_u16(&mut cursor)?,
            frame_height: crate::codec::decode_u16(&mut cursor)?,
            frame_bpp: decode_u8(&mut cursor)?,
            frame_format: decode_u8(&mut cursor)?,
            frame_id: decode_u8(&mut cursor)?,
            frame_timestamp: decode_u32(&mut cursor)?,
            state_timestamp: decode_u32(&mut cursor)?,
            state: StateMessage::decode(&mut cursor)?,
            tof_timestamp: decode_u32(&mut cursor)?,
            tof: TofMessage::decode(&mut cursor)?,
            reply_frame_timestamp: decode_u32(&mut cursor)?,
            reply_recv_timestamp: decode_u32(&mut cursor)?,
            inference: InferenceStampedMessage::decode(&mut cursor)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata_bytes() -> Vec<u8> {
        let mut buf = vec![0u8; StreamerMetadata::SIZE];
        buf[0] = METADATA_VERSION;
        buf[1..3].copy_from_slice(&80u16.to_le_bytes()); // frame_width
        buf[3..5].copy_from_slice(&60u16.to_le_bytes()); // frame_height
        buf[5] = 1; // frame_bpp
        buf[6] = 0; // frame_format
        buf[7] = 42; // frame_id
        buf
    }

    #[test]
    fn decode_rejects_unsupported_version() {
        let mut bytes = sample_metadata_bytes();
        bytes[0] = 9;
        let err = StreamerMetadata::decode(&bytes).unwrap_err();
        assert!(matches!(err, MetadataError::UnsupportedVersion(9)));
    }

    #[test]
    fn decode_reads_geometry_fields() {
        let bytes = sample_metadata_bytes();
        let metadata = StreamerMetadata::decode(&bytes).unwrap();
        assert_eq!(metadata.frame_width, 80);
        assert_eq!(metadata.frame_height, 60);
        assert_eq!(metadata.frame_bpp, 1);
        assert_eq!(metadata.frame_id, 42);
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let bytes = sample_metadata_bytes();
        let err = StreamerMetadata::decode(&bytes[..10]).unwrap_err();
        assert!(matches!(err, MetadataError::Codec(_)));
    }

    #[test]
    fn tof_grid_side_absent_when_resolution_zero() {
        let tof = TofMessage {
            resolution: 0,
            data: [0u8; 64],
        };
        assert_eq!(tof.grid_side(), None);
    }

    #[test]
    fn tof_grid_side_present_for_64_samples() {
        let tof = TofMessage {
            resolution: 64,
            data: [7u8; 64],
        };
        assert_eq!(tof.grid_side(), Some(8));
        assert_eq!(tof.samples().len(), 64);
    }
}

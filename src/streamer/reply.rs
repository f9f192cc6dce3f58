// ABOUTME: Outbound reply buffer construction (RTT echo stats plus optional inference result)
// ABOUTME: Mirrors the onboard OffboardBuffer layout so the reassembled bytes line up with what the vision MCU expects

use super::metadata::{InferenceStampedMessage, StreamerMetadata};
use bytes::BytesMut;

/// Echoes the frame timestamp/id a reply responds to, for RTT accounting
/// on the sending side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamerStats {
    pub reply_frame_timestamp: u32,
    pub reply_frame_id: u8,
}

impl StreamerStats {
    pub const SIZE: usize = 4 + 1;

    fn encode(&self, buf: &mut BytesMut) {
        use crate::codec::encode_u32;
        encode_u32(buf, self.reply_frame_timestamp);
        crate::codec::encode_u8(buf, self.reply_frame_id);
    }
}

/// The reply buffer sent back to the vision MCU after processing a frame:
/// RTT stats plus an optional onboard-inference echo.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffboardBuffer {
    pub stats: StreamerStats,
    pub inference_stamped: InferenceStampedMessage,
}

impl OffboardBuffer {
    pub const SIZE: usize = StreamerStats::SIZE + InferenceStampedMessage::SIZE;

    /// Build a reply for `metadata`. When `network_output` is `None`, the
    /// inference timestamp is sent as zero and the payload floats are
    /// unspecified, per the "no output available" convention.
    pub fn new(metadata: &StreamerMetadata, network_output: Option<[f32; 4]>) -> Self {
        let stats = StreamerStats {
            reply_frame_timestamp: metadata.frame_timestamp,
            reply_frame_id: metadata.frame_id,
        };

        let inference_stamped = match network_output {
            None => InferenceStampedMessage {
                stm32_timestamp: 0,
                x: 0.0,
                y: 0.0,
                z: 0.0,
                phi: 0.0,
            },
            Some([x, y, z, phi]) => InferenceStampedMessage {
                stm32_timestamp: metadata.state.timestamp,
                x,
                y,
                z,
                phi,
            },
        };

        Self {
            stats,
            inference_stamped,
        }
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.stats.encode(&mut buf);
        self.inference_stamped.encode(&mut buf);
        buf
    }
}

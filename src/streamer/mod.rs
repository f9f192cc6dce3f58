// ABOUTME: The application-level buffer protocol layered on top of CPX
// ABOUTME: Re-exports the pieces a consumer needs: Streamer, its error type, metadata, and FPS/RTT accounting

pub mod engine;
pub mod metadata;
pub mod reply;
pub mod stats;

pub use engine::{PixelGrid, Streamer, StreamerError};
pub use metadata::{
    BufferType, InferenceStampedMessage, MetadataError, StateMessage, StreamerMetadata,
    TofMessage, METADATA_VERSION,
};
pub use reply::{OffboardBuffer, StreamerStats};
pub use stats::{FrameStats, FrameStatsReport};

pub mod client;
pub mod codec;
pub mod frame;
pub mod streamer;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::{CpxClient, CpxClientOptions, CpxError, CpxResult};
pub use frame::{CPX_VERSION, CpxFunction, CpxHeader, CpxPacket, CpxTarget, FrameError};
pub use streamer::{BufferType, FrameStats, Streamer, StreamerError, StreamerMetadata};
pub use transport::{MultiTransport, ReliableTransport, Transport, UnreliableTransport};

/// Error returned by most functions.
///
/// When writing a real application, one might want to consider a specialized
/// error handling crate or defining an error type as an `enum` of causes.
/// However, for our example, using a boxed `std::error::Error` is sufficient.
///
/// For performance reasons, boxing is avoided in any hot path. For example,
/// frame and streamer parsing use dedicated error enums, since those errors
/// are hit and handled during normal execution (a framing desync, a CRC
/// mismatch). `std::error::Error` is implemented for those enums so they
/// convert into this boxed type at the API boundary.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for CPX operations.
///
/// # Examples
///
/// ```rust,no_run
/// use cpx::Streamer;
///
/// #[tokio::main]
/// async fn main() -> cpx::Result<()> {
///     let mut streamer = Streamer::connect("192.168.4.1", 5000).await?;
///
///     while let Some((frame, tof, metadata)) = streamer.receive().await? {
///         println!("frame {}x{}, id {}", metadata.frame_width, metadata.frame_height, metadata.frame_id);
///         let _ = tof;
///         streamer.send_reply(&metadata, None).await?;
///     }
///
///     streamer.shutdown().await;
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

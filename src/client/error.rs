// ABOUTME: CPX client error types
// ABOUTME: Structured error reporting for session-level failures, with conversions from transport and frame errors

use crate::frame::FrameError;
use std::io;
use thiserror::Error;

/// Errors surfaced by [`super::CpxClient`].
///
/// Transport-level hiccups (a dropped TCP connection, a discarded
/// out-of-order datagram) are handled internally by the transports
/// themselves and never reach here — this type is reserved for failures a
/// caller cannot recover from without restarting the session.
#[derive(Debug, Error)]
pub enum CpxError {
    /// I/O error surfaced while sending.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// A received CPX header failed to decode.
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    /// A received packet advertised a CPX protocol version this client
    /// does not understand. Fatal: the peer is speaking a different
    /// protocol revision and the stream cannot be trusted.
    #[error("unsupported CPX protocol version {0}, expected {expected}", expected = crate::frame::CPX_VERSION)]
    UnsupportedVersion(u8),

    /// The receive queue was closed (both transports shut down).
    #[error("client shut down")]
    Closed,
}

/// Result type alias for CPX client operations.
pub type CpxResult<T> = Result<T, CpxError>;

//! The CPX packet header (bit-packed, little-endian) and the CPXPacket envelope.
//!
//! Header layout is fixed at 2 bytes. Byte 0 packs `destination` (3 bits),
//! `source` (3 bits), `last_packet` (1 bit) and a reserved bit. Byte 1 packs
//! `function` (6 bits) and `version` (2 bits). Encoding and decoding is done
//! with explicit shifts and masks rather than a compiler-defined bitfield
//! layout, since the wire format must match byte-for-byte regardless of
//! target platform or compiler.
//!
//! This module only parses the header shape; it does not reject an
//! unexpected `version`. That check is the client's job (an unsupported
//! version is a fatal session error, not a malformed frame), see
//! [`crate::client::CpxClient::receive`].

use num_enum::TryFromPrimitiveError;
use thiserror::Error;

/// The only CPX protocol version this client understands.
pub const CPX_VERSION: u8 = 0;

/// Routing endpoints on the CPX bus.
///
/// Used for both `destination` and `source` in [`CpxHeader`]. Values match
/// the on-wire encoding; do not reorder.
#[derive(num_enum::TryFromPrimitive, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CpxTarget {
    /// The flight controller MCU (STM32 on a Crazyflie).
    FlightController = 0x01,
    /// The Wi-Fi bridge MCU (ESP32 on an AI-deck).
    WifiBridge = 0x02,
    /// A remote computer connected over Wi-Fi. This client's own identity.
    WifiHost = 0x03,
    /// The vision/inference MCU (GAP on an AI-deck).
    VisionMcu = 0x04,
}

/// CPX subsystem routing field.
#[derive(num_enum::TryFromPrimitive, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CpxFunction {
    System = 0x01,
    Console = 0x02,
    Crtp = 0x03,
    WifiCtrl = 0x04,
    App = 0x05,
    Streamer = 0x06,
    Test = 0x0E,
    Bootloader = 0x0F,
}

/// Errors raised while decoding a [`CpxHeader`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer too short: need {need} bytes, have {have}")]
    Incomplete { need: usize, have: usize },

    #[error("invalid destination/source target 0x{0:02x}")]
    InvalidTarget(u8),

    #[error("invalid function 0x{0:02x}")]
    InvalidFunction(u8),
}

impl From<TryFromPrimitiveError<CpxTarget>> for FrameError {
    fn from(err: TryFromPrimitiveError<CpxTarget>) -> Self {
        FrameError::InvalidTarget(err.number)
    }
}

impl From<TryFromPrimitiveError<CpxFunction>> for FrameError {
    fn from(err: TryFromPrimitiveError<CpxFunction>) -> Self {
        FrameError::InvalidFunction(err.number)
    }
}

/// The 2-byte CPX header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpxHeader {
    pub destination: CpxTarget,
    pub source: CpxTarget,
    pub last_packet: bool,
    pub function: CpxFunction,
    pub version: u8,
}

impl CpxHeader {
    pub const SIZE: usize = 2;

    /// Build a header for a packet this client sends. Always stamped with
    /// [`CPX_VERSION`]; a peer advertising a different version is only
    /// ever observed on receive.
    pub fn new(destination: CpxTarget, function: CpxFunction) -> Self {
        Self {
            destination,
            source: CpxTarget::WifiHost,
            last_packet: true,
            function,
            version: CPX_VERSION,
        }
    }

    /// Encode this header to exactly [`CpxHeader::SIZE`] bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let byte0 = (self.destination as u8 & 0x07)
            | ((self.source as u8 & 0x07) << 3)
            | ((self.last_packet as u8) << 6);
        let byte1 = (self.function as u8 & 0x3F) | ((self.version & 0x03) << 6);
        [byte0, byte1]
    }

    /// Decode a header from the first [`CpxHeader::SIZE`] bytes of `buf`.
    ///
    /// Does not validate `version` — see the module docs.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < Self::SIZE {
            return Err(FrameError::Incomplete {
                need: Self::SIZE,
                have: buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        let destination = byte0 & 0x07;
        let source = (byte0 >> 3) & 0x07;
        let last_packet = (byte0 >> 6) & 0x01 != 0;

        let function = byte1 & 0x3F;
        let version = (byte1 >> 6) & 0x03;

        Ok(CpxHeader {
            destination: CpxTarget::try_from(destination)?,
            source: CpxTarget::try_from(source)?,
            last_packet,
            function: CpxFunction::try_from(function)?,
            version,
        })
    }
}

/// A CPX header plus an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpxPacket {
    pub header: CpxHeader,
    pub payload: Vec<u8>,
}

impl CpxPacket {
    pub fn new(header: CpxHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }
}

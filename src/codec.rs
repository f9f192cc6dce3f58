//! Shared little-endian wire-format helpers.
//!
//! CPX and everything layered on top of it (transport framing, streamer
//! segment headers) is little-endian, unlike the teacher protocol this
//! crate's structure is modeled on. This module centralizes the small
//! helpers and the `Encodable`/`Decodable` traits so each fixed-layout
//! wire structure (transport headers, streamer headers) implements parsing
//! and serialization the same way.

use crate::frame::{CpxHeader, FrameError};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Errors common to decoding any fixed-layout wire structure in this crate.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("incomplete frame: need {need} bytes, have {have}")]
    Incomplete { need: usize, have: usize },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Types that can be encoded into a growable byte buffer.
pub trait Encodable {
    fn encode(&self, buf: &mut BytesMut);

    fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }
}

/// Types that can be decoded from a byte cursor.
pub trait Decodable: Sized {
    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError>;
}

pub fn decode_u8(buf: &mut Cursor<&[u8]>) -> Result<u8, CodecError> {
    require(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn decode_u16(buf: &mut Cursor<&[u8]>) -> Result<u16, CodecError> {
    require(buf, 2)?;
    Ok(buf.get_u16_le())
}

pub fn decode_u32(buf: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    require(buf, 4)?;
    Ok(buf.get_u32_le())
}

pub fn decode_i16(buf: &mut Cursor<&[u8]>) -> Result<i16, CodecError> {
    require(buf, 2)?;
    Ok(buf.get_i16_le())
}

pub fn decode_i32(buf: &mut Cursor<&[u8]>) -> Result<i32, CodecError> {
    require(buf, 4)?;
    Ok(buf.get_i32_le())
}

pub fn decode_f32(buf: &mut Cursor<&[u8]>) -> Result<f32, CodecError> {
    require(buf, 4)?;
    Ok(buf.get_f32_le())
}

pub fn decode_bytes(buf: &mut Cursor<&[u8]>, n: usize) -> Result<Vec<u8>, CodecError> {
    require(buf, n)?;
    let mut out = vec![0u8; n];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

pub fn skip(buf: &mut Cursor<&[u8]>, n: usize) -> Result<(), CodecError> {
    require(buf, n)?;
    buf.advance(n);
    Ok(())
}

fn require(buf: &Cursor<&[u8]>, n: usize) -> Result<(), CodecError> {
    if buf.remaining() < n {
        return Err(CodecError::Incomplete {
            need: n,
            have: buf.remaining(),
        });
    }
    Ok(())
}

pub fn encode_u8(buf: &mut BytesMut, value: u8) {
    buf.put_u8(value);
}

pub fn encode_u16(buf: &mut BytesMut, value: u16) {
    buf.put_u16_le(value);
}

pub fn encode_u32(buf: &mut BytesMut, value: u32) {
    buf.put_u32_le(value);
}

pub fn encode_i16(buf: &mut BytesMut, value: i16) {
    buf.put_i16_le(value);
}

pub fn encode_i32(buf: &mut BytesMut, value: i32) {
    buf.put_i32_le(value);
}

pub fn encode_f32(buf: &mut BytesMut, value: f32) {
    buf.put_f32_le(value);
}

/// The 4-byte header prefixed to every frame on the reliable transport:
/// a little-endian payload length followed by the CPX header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReliableHeader {
    pub length: u16,
    pub cpx: CpxHeader,
}

impl ReliableHeader {
    pub const SIZE: usize = 2 + CpxHeader::SIZE;

    pub fn new(length: u16, cpx: CpxHeader) -> Self {
        Self { length, cpx }
    }
}

impl Encodable for ReliableHeader {
    fn encode(&self, buf: &mut BytesMut) {
        encode_u16(buf, self.length);
        buf.put_slice(&self.cpx.encode());
    }
}

impl Decodable for ReliableHeader {
    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let length = decode_u16(buf)?;
        let cpx_bytes = decode_bytes(buf, CpxHeader::SIZE)?;
        let cpx = CpxHeader::decode(&cpx_bytes)?;
        Ok(ReliableHeader { length, cpx })
    }
}

/// The 4-byte header prefixed to every datagram on the unreliable transport:
/// a little-endian sequence number followed by the CPX header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatagramHeader {
    pub sequence: u16,
    pub cpx: CpxHeader,
}

impl DatagramHeader {
    pub const SIZE: usize = 2 + CpxHeader::SIZE;

    pub fn new(sequence: u16, cpx: CpxHeader) -> Self {
        Self { sequence, cpx }
    }
}

impl Encodable for DatagramHeader {
    fn encode(&self, buf: &mut BytesMut) {
        encode_u16(buf, self.sequence);
        buf.put_slice(&self.cpx.encode());
    }
}

impl Decodable for DatagramHeader {
    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let sequence = decode_u16(buf)?;
        let cpx_bytes = decode_bytes(buf, CpxHeader::SIZE)?;
        let cpx = CpxHeader::decode(&cpx_bytes)?;
        Ok(DatagramHeader { sequence, cpx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CpxFunction, CpxTarget};

    #[test]
    fn reliable_header_roundtrip() {
        let cpx = CpxHeader::new(CpxTarget::VisionMcu, CpxFunction::Streamer);
        let header = ReliableHeader::new(1234, cpx);
        let bytes = header.to_bytes();
        let mut cursor = Cursor::new(bytes.as_ref());
        let decoded = ReliableHeader::decode(&mut cursor).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn datagram_header_roundtrip() {
        let cpx = CpxHeader::new(CpxTarget::FlightController, CpxFunction::Crtp);
        let header = DatagramHeader::new(65535, cpx);
        let bytes = header.to_bytes();
        let mut cursor = Cursor::new(bytes.as_ref());
        let decoded = DatagramHeader::decode(&mut cursor).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn decode_incomplete_buffer() {
        let mut cursor = Cursor::new(&b"\x01"[..]);
        let err = ReliableHeader::decode(&mut cursor).unwrap_err();
        assert!(matches!(err, CodecError::Incomplete { .. }));
    }

    #[test]
    fn little_endian_u16_roundtrip() {
        let mut buf = BytesMut::new();
        encode_u16(&mut buf, 0xABCD);
        assert_eq!(buf.as_ref(), &[0xCD, 0xAB]);
        let mut cursor = Cursor::new(buf.as_ref());
        assert_eq!(decode_u16(&mut cursor).unwrap(), 0xABCD);
    }
}

// ABOUTME: Shared transport primitives for the two concrete CPX transports
// ABOUTME: Defines the Transport trait, the event type both transports feed into a multiplexer, and shared sizing constants

pub mod multi;
pub mod reliable;
pub mod unreliable;

pub use multi::MultiTransport;
pub use reliable::ReliableTransport;
pub use unreliable::UnreliableTransport;

use crate::frame::CpxPacket;

/// Largest frame either concrete transport will put on the wire, header
/// included. Both transports use a 4-byte framing header, so their usable
/// MTU (`max_frame_length`) is this value minus 4.
pub const MAX_FRAME_LENGTH: usize = 4092;

/// An item produced by a transport's receive loop.
///
/// `Reset` is emitted whenever the underlying connection is
/// (re)established, before any packets from that connection. Consumers use
/// it to discard any in-flight reassembly state and, in the case of the
/// multiplexer, to rebind the unreliable transport to the reliable
/// transport's new local port.
#[derive(Debug)]
pub enum TransportEvent {
    Reset,
    Packet(CpxPacket),
}

/// Behavior shared by [`ReliableTransport`] and [`UnreliableTransport`].
pub trait Transport {
    /// Largest CPX payload this transport can carry in a single frame.
    fn max_frame_length(&self) -> usize;

    /// Stop the transport's background task and release its socket.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}

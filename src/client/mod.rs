// ABOUTME: CPX session client layered over the reliable/unreliable transport multiplexer
// ABOUTME: Enforces the protocol version on receive and exposes a single packet-observation callback

//! The CPX session client.
//!
//! Everything below [`crate::transport`] moves bytes; this module is where
//! "bytes that happen to decode" becomes "a CPX session". A [`CpxClient`]
//! owns a [`MultiTransport`], validates `version == 0` on every inbound
//! packet (an unsupported version is fatal, per the protocol), and reports
//! the usable payload size to callers building outbound packets.

pub mod error;
pub mod types;

pub use error::{CpxError, CpxResult};
pub use types::CpxClientOptions;

use crate::frame::{CpxHeader, CpxPacket, CPX_VERSION};
use crate::transport::{MultiTransport, Transport};
use std::sync::Mutex;

/// A callback invoked synchronously on every packet sent or received.
type PacketObserver = Box<dyn Fn(&CpxPacket) + Send + Sync>;

/// A connected CPX session.
///
/// Send and receive are independent: `send` never blocks on `receive`, and
/// vice versa, since they're backed by different halves of the underlying
/// transports. Only one observer callback can be registered at a time;
/// registering a new one replaces the old.
pub struct CpxClient {
    transport: MultiTransport,
    observer: Mutex<Option<PacketObserver>>,
}

impl CpxClient {
    /// Connect to the remote endpoint described by `options`, bringing up
    /// both the reliable and unreliable transports.
    pub fn connect(options: CpxClientOptions) -> Self {
        let transport = MultiTransport::with_rx_queue_depth(
            options.remote_host,
            options.remote_port,
            options.udp_send,
            options.rx_queue_depth,
        );

        Self {
            transport,
            observer: Mutex::new(None),
        }
    }

    /// Register a callback invoked synchronously on every packet this
    /// client sends or receives. Replaces any previously registered
    /// callback.
    pub fn set_observer(&self, observer: impl Fn(&CpxPacket) + Send + Sync + 'static) {
        *self.observer.lock().unwrap() = Some(Box::new(observer));
    }

    /// Clear the registered observer, if any.
    pub fn clear_observer(&self) {
        *self.observer.lock().unwrap() = None;
    }

    /// The largest CPX payload this client can send or receive in a single
    /// packet: the transport's MTU minus the CPX header.
    pub fn max_payload_length(&self) -> usize {
        self.transport.max_frame_length() - CpxHeader::SIZE
    }

    /// Send a packet, notifying the observer (if any) first.
    pub async fn send(&self, packet: &CpxPacket) -> CpxResult<()> {
        self.notify(packet);
        self.transport.send(packet).await?;
        Ok(())
    }

    /// Receive the next packet, validating its protocol version.
    ///
    /// Returns [`CpxError::UnsupportedVersion`] if the peer sent a packet
    /// tagged with a version this client does not understand — this ends
    /// the stream for the caller, since the rest of the session cannot be
    /// trusted once the wire format itself is in question. Returns
    /// [`CpxError::Closed`] once both transports have shut down.
    pub async fn receive(&self) -> CpxResult<CpxPacket> {
        let packet = self.transport.recv().await.ok_or(CpxError::Closed)?;

        if packet.header.version != CPX_VERSION {
            return Err(CpxError::UnsupportedVersion(packet.header.version));
        }

        self.notify(&packet);
        Ok(packet)
    }

    /// Stop both transports and release their sockets.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }

    fn notify(&self, packet: &CpxPacket) {
        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            observer(packet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CpxFunction, CpxTarget};

    #[test]
    fn max_payload_length_accounts_for_header() {
        let client = CpxClient::connect(CpxClientOptions::new("127.0.0.1", 0));
        assert_eq!(
            client.max_payload_length(),
            client.transport.max_frame_length() - CpxHeader::SIZE,
        );
    }

    #[test]
    fn observer_receives_every_sent_and_received_packet() {
        let client = CpxClient::connect(CpxClientOptions::new("127.0.0.1", 0));
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen_clone = seen.clone();
        client.set_observer(move |_packet| {
            seen_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let header = CpxHeader::new(CpxTarget::VisionMcu, CpxFunction::Streamer);
        let packet = CpxPacket::new(header, vec![1, 2, 3]);
        client.notify(&packet);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);

        client.clear_observer();
        client.notify(&packet);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}

// ABOUTME: Sequenced datagram transport carrying CPX frames over UDP
// ABOUTME: Tracks a monotonic receive sequence and discards/resyncs on regression rather than reordering

use crate::codec::{Decodable, Encodable};
use crate::frame::CpxPacket;
use crate::transport::{Transport, TransportEvent, MAX_FRAME_LENGTH};
use std::io::{self, Cursor};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::codec::DatagramHeader;

const EVENT_QUEUE_DEPTH: usize = 16;

struct Connection {
    socket: Arc<UdpSocket>,
    next_tx_seq: u16,
    next_rx_seq: Option<u16>,
}

/// A sequenced datagram transport.
///
/// Unlike [`ReliableTransport`](super::ReliableTransport), this transport
/// does not reconnect on its own: it is bound and connected at the
/// direction of a caller (typically the multiplexer, in response to the
/// reliable transport's reset events) and simply waits while disconnected.
/// Received sequence numbers are compared with plain integer comparison;
/// a regression discards the datagram and resets tracking so the next
/// datagram received, whatever its sequence number, re-anchors the stream.
pub struct UnreliableTransport {
    remote_host: String,
    remote_port: u16,
    conn: Arc<Mutex<Option<Connection>>>,
    connected: Arc<Notify>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    task: JoinHandle<()>,
}

impl UnreliableTransport {
    /// Construct a transport targeting `remote_host:remote_port`. The
    /// transport starts disconnected; call [`UnreliableTransport::connect`]
    /// to bind a local port and begin receiving.
    pub fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        let remote_host = remote_host.into();
        let conn = Arc::new(Mutex::new(None));
        let connected = Arc::new(Notify::new());
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let task = tokio::spawn(receive_loop(conn.clone(), connected.clone(), events_tx));

        Self {
            remote_host,
            remote_port,
            conn,
            connected,
            events: Mutex::new(events_rx),
            task,
        }
    }

    /// Bind to `local_port` (or any available port if 0) and connect to the
    /// configured remote endpoint. Resets the transmit and receive
    /// sequence counters.
    pub async fn connect(&self, local_port: u16) -> io::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port)).await?;
        socket.connect((self.remote_host.as_str(), self.remote_port)).await?;

        let mut guard = self.conn.lock().await;
        *guard = Some(Connection {
            socket: Arc::new(socket),
            next_tx_seq: 0,
            next_rx_seq: None,
        });
        drop(guard);

        self.connected.notify_waiters();
        Ok(())
    }

    /// Unbind the local socket. Sends become no-ops and the receive loop
    /// waits until [`UnreliableTransport::connect`] is called again.
    pub async fn disconnect(&self) {
        *self.conn.lock().await = None;
        self.connected.notify_waiters();
    }

    /// Wait for the next transport event.
    pub async fn recv(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    /// Send a packet. A no-op if not currently connected.
    pub async fn send(&self, packet: &CpxPacket) -> io::Result<()> {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Ok(());
        };

        let header = DatagramHeader::new(conn.next_tx_seq, packet.header);
        let mut frame = header.to_bytes();
        frame.extend_from_slice(&packet.payload);

        conn.socket.send(&frame).await?;
        conn.next_tx_seq = conn.next_tx_seq.wrapping_add(1);
        Ok(())
    }
}

impl Transport for UnreliableTransport {
    fn max_frame_length(&self) -> usize {
        MAX_FRAME_LENGTH - DatagramHeader::SIZE
    }

    async fn shutdown(&self) {
        self.task.abort();
        *self.conn.lock().await = None;
    }
}

async fn receive_loop(
    conn: Arc<Mutex<Option<Connection>>>,
    connected: Arc<Notify>,
    events_tx: mpsc::Sender<TransportEvent>,
) {
    let mut buf = vec![0u8; MAX_FRAME_LENGTH];

    'rebind: loop {
        let socket = loop {
            let existing = conn.lock().await.as_ref().map(|c| c.socket.clone());
            if let Some(socket) = existing {
                break socket;
            }
            connected.notified().await;
        };

        loop {
            tokio::select! {
                result = socket.recv(&mut buf) => {
                    match result {
                        Ok(n) => {
                            if let Some(packet) = validate_datagram(&conn, &buf[..n]).await {
                                if events_tx.send(TransportEvent::Packet(packet)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(err) if err.kind() == io::ErrorKind::NotConnected => {
                            continue 'rebind;
                        }
                        Err(err) => {
                            tracing::warn!(%err, "unreliable transport recv failed");
                        }
                    }
                }
                _ = connected.notified() => {
                    // The connection was rebound (or torn down) under us;
                    // re-fetch the socket instead of reading from a stale one.
                    continue 'rebind;
                }
            }
        }
    }
}

async fn validate_datagram(
    conn: &Arc<Mutex<Option<Connection>>>,
    buf: &[u8],
) -> Option<CpxPacket> {
    let mut cursor = Cursor::new(buf);
    let header = match DatagramHeader::decode(&mut cursor) {
        Ok(header) => header,
        Err(err) => {
            tracing::debug!(%err, "dropping malformed datagram");
            return None;
        }
    };

    let max_payload = MAX_FRAME_LENGTH - DatagramHeader::SIZE;
    let payload = &buf[DatagramHeader::SIZE..];
    if payload.len() > max_payload {
        tracing::debug!("dropping oversized datagram");
        return None;
    }

    let mut guard = conn.lock().await;
    let Some(active) = guard.as_mut() else {
        return None;
    };

    if let Some(expected) = active.next_rx_seq {
        if header.sequence < expected {
            tracing::debug!(
                sequence = header.sequence,
                expected,
                "datagram sequence regressed, resyncing"
            );
            active.next_rx_seq = None;
            return None;
        }
    }
    active.next_rx_seq = Some(header.sequence.wrapping_add(1));

    Some(CpxPacket::new(header.cpx, payload.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CpxFunction, CpxHeader, CpxTarget};

    fn make_datagram(sequence: u16, payload: &[u8]) -> Vec<u8> {
        let header = CpxHeader::new(CpxTarget::VisionMcu, CpxFunction::Streamer);
        let mut frame = DatagramHeader::new(sequence, header).to_bytes();
        frame.extend_from_slice(payload);
        frame.to_vec()
    }

    #[tokio::test]
    async fn accepts_increasing_sequence() {
        let conn = Arc::new(Mutex::new(Some(Connection {
            socket: Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap()),
            next_tx_seq: 0,
            next_rx_seq: None,
        })));

        let first = make_datagram(0, &[1, 2, 3]);
        let packet = validate_datagram(&conn, &first).await.unwrap();
        assert_eq!(packet.payload, vec![1, 2, 3]);

        let second = make_datagram(1, &[4, 5]);
        let packet = validate_datagram(&conn, &second).await.unwrap();
        assert_eq!(packet.payload, vec![4, 5]);
    }

    #[tokio::test]
    async fn regressed_sequence_discards_and_resyncs() {
        let conn = Arc::new(Mutex::new(Some(Connection {
            socket: Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap()),
            next_tx_seq: 0,
            next_rx_seq: Some(5),
        })));

        let regressed = make_datagram(3, &[9]);
        assert!(validate_datagram(&conn, &regressed).await.is_none());

        let guard = conn.lock().await;
        assert_eq!(guard.as_ref().unwrap().next_rx_seq, None);
    }
}

// ABOUTME: Reconnecting stream transport carrying length-prefixed CPX frames over TCP
// ABOUTME: Owns a background task that reconnects on failure and emits a reset event before the first frame of each connection

use crate::codec::{Decodable, Encodable};
use crate::frame::{CpxHeader, CpxPacket};
use crate::transport::{Transport, TransportEvent, MAX_FRAME_LENGTH};
use bytes::{Buf, BytesMut};
use socket2::{SockRef, TcpKeepalive};
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::codec::ReliableHeader;

const RECEIVE_CHUNK: usize = 1024;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const EVENT_QUEUE_DEPTH: usize = 16;

// sizeof(OffboardBuffer) * 10: 5 bytes of stats (u32 + u8) plus 20 bytes
// of inference-stamped payload (u32 + 4x f32), times a depth of 10 replies.
// Kept as a literal here rather than importing the streamer module, to
// avoid a dependency cycle between transport sizing and streamer layout.
const SEND_BUFFER_SIZE: usize = 25 * 10;

/// A reconnecting, length-prefixed stream transport.
///
/// Mirrors a TCP client socket: on any disconnect (timeout, reset, or a
/// framing desync) it transparently reconnects to the same remote address
/// and keeps going. Every successful (re)connection yields a
/// [`TransportEvent::Reset`] before any frames from that connection, so
/// callers can discard stale reassembly state.
pub struct ReliableTransport {
    write_half: Arc<Mutex<Option<OwnedWriteHalf>>>,
    local_port: Arc<AtomicU16>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    task: JoinHandle<()>,
}

impl ReliableTransport {
    /// Connect to `remote_host:remote_port`, starting the background
    /// reconnect loop immediately. The returned transport is usable right
    /// away; [`ReliableTransport::recv`] yields a `Reset` once the first
    /// connection attempt succeeds.
    pub fn connect(remote_host: impl Into<String>, remote_port: u16) -> Self {
        let remote_host = remote_host.into();
        let write_half = Arc::new(Mutex::new(None));
        let local_port = Arc::new(AtomicU16::new(0));
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let task = tokio::spawn(reconnect_loop(
            remote_host,
            remote_port,
            write_half.clone(),
            local_port.clone(),
            events_tx,
        ));

        Self {
            write_half,
            local_port,
            events: Mutex::new(events_rx),
            task,
        }
    }

    /// The local TCP port of the current connection, or 0 if not currently
    /// connected. Used by the multiplexer to rebind the unreliable
    /// transport to the same local port after every reconnect.
    pub fn local_port(&self) -> u16 {
        self.local_port.load(Ordering::Acquire)
    }

    /// Wait for the next transport event.
    ///
    /// Returns `None` once the background task has exited, which only
    /// happens after [`ReliableTransport::shutdown`].
    pub async fn recv(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    /// Send a packet. A no-op (returns `Ok(())`) if not currently
    /// connected, matching the reference client's "drop writes while
    /// disconnected" behavior.
    pub async fn send(&self, packet: &CpxPacket) -> io::Result<()> {
        let mut guard = self.write_half.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Ok(());
        };

        let header = ReliableHeader::new(packet.payload.len() as u16, packet.header);
        let mut frame = header.to_bytes();
        frame.extend_from_slice(&packet.payload);

        use tokio::io::AsyncWriteExt;
        match stream.write_all(&frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(%err, "reliable transport write failed, disconnecting");
                *guard = None;
                Err(err)
            }
        }
    }
}

impl Transport for ReliableTransport {
    fn max_frame_length(&self) -> usize {
        MAX_FRAME_LENGTH - ReliableHeader::SIZE
    }

    async fn shutdown(&self) {
        self.task.abort();
        *self.write_half.lock().await = None;
    }
}

async fn reconnect_loop(
    remote_host: String,
    remote_port: u16,
    write_half: Arc<Mutex<Option<OwnedWriteHalf>>>,
    local_port: Arc<AtomicU16>,
    events_tx: mpsc::Sender<TransportEvent>,
) {
    loop {
        match TcpStream::connect((remote_host.as_str(), remote_port)).await {
            Ok(stream) => {
                if let Err(err) = configure_socket(&stream) {
                    tracing::warn!(%err, "failed to set TCP socket options");
                }

                let addr = match stream.local_addr() {
                    Ok(addr) => addr,
                    Err(err) => {
                        tracing::warn!(%err, "failed to read local address after connect");
                        continue;
                    }
                };
                local_port.store(addr.port(), Ordering::Release);

                let (mut read_half, write_half_new) = stream.into_split();
                *write_half.lock().await = Some(write_half_new);

                if events_tx.send(TransportEvent::Reset).await.is_err() {
                    return;
                }

                let mut buffer = BytesMut::with_capacity(4 * RECEIVE_CHUNK);
                loop {
                    match read_frame(&mut read_half, &mut buffer).await {
                        Ok(Some(packet)) => {
                            if events_tx.send(TransportEvent::Packet(packet)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            tracing::debug!(%err, "reliable transport read loop ended");
                            break;
                        }
                    }
                }

                *write_half.lock().await = None;
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::ConnectionRefused
                ) =>
            {
                continue;
            }
            Err(err) => {
                tracing::error!(%err, "reliable transport connect failed, backing off");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }
}

/// Read one length-prefixed CPX frame from `reader`, buffering partial
/// reads in `buffer`. Implements the WAIT_HEADER/WAIT_PAYLOAD state
/// machine: the header is decoded as soon as 4 bytes are available, then
/// the read loop waits for `header.length` more bytes before returning the
/// assembled packet.
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    buffer: &mut BytesMut,
) -> io::Result<Option<CpxPacket>> {
    loop {
        if buffer.len() >= ReliableHeader::SIZE {
            let mut cursor = Cursor::new(&buffer[..]);
            let header = ReliableHeader::decode(&mut cursor)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            let header_len = cursor.position() as usize;
            let total_len = header_len + header.length as usize;

            let max_payload = MAX_FRAME_LENGTH - ReliableHeader::SIZE;
            if header.length as usize > max_payload {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "frame length exceeds transport MTU",
                ));
            }

            if buffer.len() >= total_len {
                buffer.advance(header_len);
                let payload = buffer.split_to(header.length as usize).to_vec();
                return Ok(Some(CpxPacket::new(header.cpx, payload)));
            }
        }

        let mut chunk = [0u8; RECEIVE_CHUNK];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return if buffer.is_empty() {
                Ok(None)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                ))
            };
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

fn configure_socket(stream: &TcpStream) -> io::Result<()> {
    let sock = SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(1))
        .with_interval(Duration::from_secs(1));
    #[cfg(not(any(target_os = "windows", target_os = "openbsd")))]
    let keepalive = keepalive.with_retries(5);
    sock.set_tcp_keepalive(&keepalive)?;

    sock.set_linger(Some(Duration::from_secs(5)))?;
    sock.set_nodelay(true)?;
    sock.set_send_buffer_size(SEND_BUFFER_SIZE)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CpxFunction, CpxTarget};

    #[tokio::test]
    async fn read_frame_reassembles_split_reads() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let header = CpxHeader::new(CpxTarget::VisionMcu, CpxFunction::Streamer);
        let frame_header = ReliableHeader::new(3, header);
        let mut frame = frame_header.to_bytes();
        frame.extend_from_slice(&[1, 2, 3]);

        use tokio::io::AsyncWriteExt;
        let write_task = tokio::spawn(async move {
            // Dribble the bytes out one at a time to exercise the partial-read path.
            for byte in frame {
                server.write_all(&[byte]).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut buffer = BytesMut::new();
        let packet = read_frame(&mut client, &mut buffer)
            .await
            .unwrap()
            .expect("frame should have decoded");
        assert_eq!(packet.header, header);
        assert_eq!(packet.payload, vec![1, 2, 3]);

        write_task.await.unwrap();
    }

    #[tokio::test]
    async fn read_frame_rejects_oversized_length() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let header = CpxHeader::new(CpxTarget::FlightController, CpxFunction::System);
        let frame_header = ReliableHeader::new(u16::MAX, header);

        use tokio::io::AsyncWriteExt;
        server.write_all(&frame_header.to_bytes()).await.unwrap();
        drop(server);

        let mut buffer = BytesMut::new();
        let err = read_frame(&mut client, &mut buffer).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

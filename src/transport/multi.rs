// ABOUTME: Multiplexes the reliable and unreliable transports into one receive queue
// ABOUTME: Rebinds the unreliable transport to the reliable transport's local port on every reconnect

use crate::frame::CpxPacket;
use crate::transport::{ReliableTransport, Transport, TransportEvent, UnreliableTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_RX_QUEUE_DEPTH: usize = 2;

/// Combines a [`ReliableTransport`] and an [`UnreliableTransport`] pointed
/// at the same remote endpoint into a single packet stream.
///
/// Sends are routed to one transport or the other depending on
/// `udp_send`. Receives from both transports are funneled into one bounded
/// queue; a reset on the reliable transport triggers an unbind/rebind of
/// the unreliable transport onto the reliable transport's (possibly new)
/// local port, since both must share a local port for the peer to
/// associate them.
pub struct MultiTransport {
    tcp: Arc<ReliableTransport>,
    udp: Arc<UnreliableTransport>,
    udp_send: bool,
    rx: tokio::sync::Mutex<mpsc::Receiver<CpxPacket>>,
    tcp_task: JoinHandle<()>,
    udp_task: JoinHandle<()>,
}

impl MultiTransport {
    /// Connect to `remote_host:remote_port` over both transports.
    ///
    /// # Panics
    ///
    /// Panics if the two transports disagree on `max_frame_length` — they
    /// must, since both are configured from the same [`MAX_FRAME_LENGTH`](super::MAX_FRAME_LENGTH)
    /// constant and differ only in header size, which is equal for both.
    pub fn connect(remote_host: impl Into<String>, remote_port: u16, udp_send: bool) -> Self {
        Self::with_rx_queue_depth(remote_host, remote_port, udp_send, DEFAULT_RX_QUEUE_DEPTH)
    }

    pub fn with_rx_queue_depth(
        remote_host: impl Into<String>,
        remote_port: u16,
        udp_send: bool,
        rx_queue_depth: usize,
    ) -> Self {
        let remote_host = remote_host.into();
        let tcp = Arc::new(ReliableTransport::connect(remote_host.clone(), remote_port));
        let udp = Arc::new(UnreliableTransport::new(remote_host, remote_port));

        assert_eq!(
            tcp.max_frame_length(),
            udp.max_frame_length(),
            "reliable ({}) and unreliable ({}) transport MTUs must match",
            tcp.max_frame_length(),
            udp.max_frame_length(),
        );

        if udp_send {
            tracing::info!("replies will be sent over the unreliable transport");
        }

        let (rx_tx, rx) = mpsc::channel(rx_queue_depth.max(1));

        let tcp_task = tokio::spawn(forward_tcp(tcp.clone(), udp.clone(), rx_tx.clone()));
        let udp_task = tokio::spawn(forward_udp(udp.clone(), rx_tx));

        Self {
            tcp,
            udp,
            udp_send,
            rx: tokio::sync::Mutex::new(rx),
            tcp_task,
            udp_task,
        }
    }

    /// Send a packet over whichever transport replies are configured to
    /// use.
    pub async fn send(&self, packet: &CpxPacket) -> std::io::Result<()> {
        if self.udp_send {
            self.udp.send(packet).await
        } else {
            self.tcp.send(packet).await
        }
    }

    /// Receive the next packet from either transport, in arrival order.
    ///
    /// Returns `None` once both underlying receive tasks have exited,
    /// which only happens after [`MultiTransport::shutdown`].
    pub async fn recv(&self) -> Option<CpxPacket> {
        self.rx.lock().await.recv().await
    }
}

impl Transport for MultiTransport {
    fn max_frame_length(&self) -> usize {
        self.tcp.max_frame_length()
    }

    async fn shutdown(&self) {
        self.tcp_task.abort();
        self.udp_task.abort();
        self.tcp.shutdown().await;
        self.udp.shutdown().await;
    }
}

async fn forward_tcp(
    tcp: Arc<ReliableTransport>,
    udp: Arc<UnreliableTransport>,
    rx_tx: mpsc::Sender<CpxPacket>,
) {
    while let Some(event) = tcp.recv().await {
        match event {
            TransportEvent::Reset => {
                let local_port = tcp.local_port();
                udp.disconnect().await;
                if let Err(err) = udp.connect(local_port).await {
                    tracing::error!(%err, local_port, "failed to rebind unreliable transport");
                }
            }
            TransportEvent::Packet(packet) => {
                if rx_tx.send(packet).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn forward_udp(udp: Arc<UnreliableTransport>, rx_tx: mpsc::Sender<CpxPacket>) {
    while let Some(event) = udp.recv().await {
        if let TransportEvent::Packet(packet) = event {
            if rx_tx.send(packet).await.is_err() {
                return;
            }
        }
    }
}

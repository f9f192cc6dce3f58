// ABOUTME: Supporting configuration type for CpxClient
// ABOUTME: Groups remote endpoint and transport tuning into a small builder, mirroring the teacher's ClientOptions

/// Configuration for [`super::CpxClient::connect`].
///
/// Mirrors the teacher crate's `ClientOptions` builder: sensible defaults,
/// fluent setters, nothing the client can't be constructed without.
#[derive(Debug, Clone)]
pub struct CpxClientOptions {
    pub(crate) remote_host: String,
    pub(crate) remote_port: u16,
    pub(crate) udp_send: bool,
    pub(crate) rx_queue_depth: usize,
}

impl CpxClientOptions {
    const DEFAULT_RX_QUEUE_DEPTH: usize = 2;

    /// Start from a remote host and port, with replies sent over the
    /// reliable transport and the default receive queue depth.
    pub fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            udp_send: false,
            rx_queue_depth: Self::DEFAULT_RX_QUEUE_DEPTH,
        }
    }

    /// Send replies over the unreliable (UDP) transport instead of the
    /// reliable one.
    pub fn with_udp_send(mut self) -> Self {
        self.udp_send = true;
        self
    }

    /// Override the bounded receive queue depth shared by both transports.
    pub fn with_rx_queue_depth(mut self, depth: usize) -> Self {
        self.rx_queue_depth = depth;
        self
    }
}

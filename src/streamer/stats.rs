// ABOUTME: FPS/RTT/dropped-frame accounting built from metadata already carried on every frame
// ABOUTME: A pure accumulator; formatting and periodic triggering are left to the caller

use super::metadata::StreamerMetadata;

/// A snapshot produced by [`FrameStats::report`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStatsReport {
    pub frame_width: u16,
    pub frame_height: u16,
    /// Frames per second, averaged over the accumulated window. `0.0` if
    /// fewer than two frames were accumulated.
    pub fps: f64,
    /// Mean round-trip latency in milliseconds.
    pub rtt_ms: f64,
    /// Frames the hardware counter implies were acquired but never
    /// reached this accumulator, accounting for `frame_id` wraparound
    /// mod 256.
    pub dropped: i64,
    /// Frames accumulated since the last report.
    pub received: usize,
    /// Frames accumulated over the accumulator's whole lifetime.
    pub total: u64,
}

/// Accumulates [`StreamerMetadata`] samples between calls to
/// [`FrameStats::report`], which resets the window and returns FPS/RTT/
/// dropped-frame numbers for it.
///
/// Frame-id wraparound is handled with `(last - first) mod 256` rather
/// than plain subtraction, since the hardware counter is a single byte.
#[derive(Debug, Default)]
pub struct FrameStats {
    window: Vec<StreamerMetadata>,
    total: u64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one received frame's metadata.
    pub fn push(&mut self, metadata: &StreamerMetadata) {
        self.window.push(*metadata);
    }

    /// Compute a report for everything accumulated since the last call,
    /// then clear the window. Returns `None` if nothing was accumulated.
    pub fn report(&mut self) -> Option<FrameStatsReport> {
        let received = self.window.len();
        if received == 0 {
            return None;
        }

        let last = *self.window.last().unwrap();
        let first = self.window[0];

        let rtt_ms = self
            .window
            .iter()
            .map(|m| (m.reply_recv_timestamp.wrapping_sub(m.reply_frame_timestamp)) as f64)
            .sum::<f64>()
            / received as f64
            / 1_000.0;

        let (fps, dropped) = if received >= 2 {
            let frame_period_secs = (last.frame_timestamp - first.frame_timestamp) as f64
                / (received - 1) as f64
                / 1_000_000.0;
            let fps = if frame_period_secs > 0.0 {
                1.0 / frame_period_secs
            } else {
                0.0
            };

            let n_acquired =
                (last.frame_id as i64 - first.frame_id as i64).rem_euclid(256) + 1;
            (fps, n_acquired - received as i64)
        } else {
            (0.0, 0)
        };

        self.total += received as u64;
        self.window.clear();

        Some(FrameStatsReport {
            frame_width: last.frame_width,
            frame_height: last.frame_height,
            fps,
            rtt_ms,
            dropped,
            received,
            total: self.total,
        })
    }
}

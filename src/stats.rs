//! Lock-free throughput and drop counters, drained once per reporting window.
//!
//! Producer and consumer roles only ever add to the counters. The reporter drains them
//! with an atomic swap, so reading a window also resets it and the two sides never need
//! to coordinate beyond the atomic instructions themselves.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters updated by the pipeline roles.
#[derive(Debug, Default)]
pub struct AvStats {
    video_frames: AtomicU64,
    encoded_bytes: AtomicU64,
    audio_chunks: AtomicU64,
    drops: AtomicU64,
}

impl AvStats {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            video_frames: AtomicU64::new(0),
            encoded_bytes: AtomicU64::new(0),
            audio_chunks: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    /// One frame was encoded and handed to the sink queue.
    #[inline]
    pub fn inc_video_frame(&self) {
        self.video_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_encoded_bytes(&self, bytes: u64) {
        self.encoded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// One audio chunk was written by the sink.
    #[inline]
    pub fn inc_audio_chunk(&self) {
        self.audio_chunks.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `n` dropped frames or chunks.
    #[inline]
    pub fn add_drops(&self, n: u64) {
        self.drops.fetch_add(n, Ordering::Relaxed);
    }

    /// Drains every counter and returns what was accumulated since the last call.
    #[inline]
    pub fn take_window(&self) -> StatsWindow {
        StatsWindow {
            video_frames: self.video_frames.swap(0, Ordering::Relaxed),
            encoded_bytes: self.encoded_bytes.swap(0, Ordering::Relaxed),
            audio_chunks: self.audio_chunks.swap(0, Ordering::Relaxed),
            drops: self.drops.swap(0, Ordering::Relaxed),
        }
    }
}

/// The counters accumulated over one reporting window.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsWindow {
    pub video_frames: u64,
    pub encoded_bytes: u64,
    pub audio_chunks: u64,
    pub drops: u64,
}

impl StatsWindow {
    /// Per-second rates for a window that lasted `len`.
    #[must_use]
    #[inline]
    pub fn rates(&self, len: Duration) -> WindowRates {
        WindowRates {
            video_fps: per_second(self.video_frames, len),
            kbps: per_second(self.encoded_bytes.saturating_mul(8), len) / 1000,
            audio_chunks_per_sec: per_second(self.audio_chunks, len),
            drops: self.drops,
        }
    }
}

/// Scales `count` observed over `len` to a rounded per-second figure. A zero-length window
/// is read as one second.
fn per_second(count: u64, len: Duration) -> u64 {
    let len_us = len.as_micros();
    if len_us == 0 {
        return count;
    }
    let scaled = (u128::from(count) * 1_000_000 + len_us / 2) / len_us;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// A [`StatsWindow`] normalised to one second. Drops stay a raw count.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WindowRates {
    pub video_fps: u64,
    pub kbps: u64,
    pub audio_chunks_per_sec: u64,
    pub drops: u64,
}

impl fmt::Display for WindowRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[STAT] video_fps={} enc_bitrate={}kbps audio_chunks_per_sec={} drop_count={}",
            self.video_fps, self.kbps, self.audio_chunks_per_sec, self.drops
        )
    }
}

/// Running sum of every drained window.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsTotals {
    pub video_frames: u64,
    pub encoded_bytes: u64,
    pub audio_chunks: u64,
    pub drops: u64,
    pub windows: u64,
}

impl StatsTotals {
    #[inline]
    pub fn accumulate(&mut self, window: &StatsWindow) {
        self.video_frames += window.video_frames;
        self.encoded_bytes += window.encoded_bytes;
        self.audio_chunks += window.audio_chunks;
        self.drops += window.drops;
        self.windows += 1;
    }
}

/// Latest PTS gap observed by each sink, in microseconds. Zero means not yet observed.
#[derive(Debug, Default)]
pub struct PtsDeltas {
    video_us: AtomicU64,
    audio_us: AtomicU64,
}

impl PtsDeltas {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { video_us: AtomicU64::new(0), audio_us: AtomicU64::new(0) }
    }

    #[inline]
    pub fn set_video(&self, delta_us: u64) {
        self.video_us.store(delta_us, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_audio(&self, delta_us: u64) {
        self.audio_us.store(delta_us, Ordering::Relaxed);
    }

    #[must_use]
    #[inline]
    pub fn video_us(&self) -> Option<u64> {
        Some(self.video_us.load(Ordering::Relaxed)).filter(|&d| d != 0)
    }

    #[must_use]
    #[inline]
    pub fn audio_us(&self) -> Option<u64> {
        Some(self.audio_us.load(Ordering::Relaxed)).filter(|&d| d != 0)
    }
}

/// Tracks the gap between consecutive PTS values seen by a sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct PtsDeltaTracker {
    last_pts_us: Option<u64>,
}

impl PtsDeltaTracker {
    /// Feeds the next PTS and returns the forward gap from the previous one, if any.
    #[inline]
    pub fn observe(&mut self, pts_us: u64) -> Option<u64> {
        let delta = self.last_pts_us.filter(|&last| pts_us > last).map(|last| pts_us - last);
        self.last_pts_us = Some(pts_us);
        delta
    }
}

/// Depth and capacity of one queue at the instant it was sampled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueueDepth {
    pub size: usize,
    pub capacity: usize,
}

impl fmt::Display for QueueDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.size, self.capacity)
    }
}

/// Everything printed in the once-per-window status line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatusLine {
    pub window: StatsWindow,
    /// How long `window` was accumulated for.
    pub window_len: Duration,
    pub raw_video: QueueDepth,
    pub encoded_video: QueueDepth,
    pub audio: QueueDepth,
    pub video_pts_delta_us: Option<u64>,
    pub audio_pts_delta_us: Option<u64>,
}

#[allow(clippy::cast_precision_loss)]
fn write_delta(f: &mut fmt::Formatter<'_>, name: &str, delta_us: Option<u64>) -> fmt::Result {
    match delta_us {
        Some(delta) => write!(f, "{name}={:.3}ms", delta as f64 / 1000.0),
        None => write!(f, "{name}=n/a"),
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | [Q] raw={} h264={} audio={} | [PTS] ",
            self.window.rates(self.window_len),
            self.raw_video, self.encoded_video, self.audio
        )?;
        write_delta(f, "video_delta", self.video_pts_delta_us)?;
        f.write_str(" ")?;
        write_delta(f, "audio_delta", self.audio_pts_delta_us)
    }
}

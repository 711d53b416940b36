//! Monotonic time source and the audio sample-accumulation timestamp policy.
//!
//! All timestamps are microseconds on a monotonic timeline. They are only meaningful
//! relative to each other and are never shown as wall-clock time.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A source of monotonic microsecond ticks.
pub trait Clock: Send + Sync {
    /// Current time in microseconds. Never decreases between calls.
    fn now_us(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// Production clock backed by [`Instant`], immune to wall-clock adjustments.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to. Used by simulated sources and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    #[must_use]
    #[inline]
    pub const fn new(start_us: u64) -> Self {
        Self { now_us: AtomicU64::new(start_us) }
    }

    /// Moves the clock forward by `delta_us`.
    #[inline]
    pub fn advance(&self, delta_us: u64) {
        self.now_us.fetch_add(delta_us, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }
}

/// Audio timestamps derived from the number of sample frames read.
///
/// The clock is sampled once at stream start; every later chunk is stamped with the
/// previous stamp plus `frames * 1_000_000 / sample_rate` in integer microseconds, so
/// audio PTS never jitters with scheduling and always matches the declared rate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AudioPtsClock {
    next_pts_us: u64,
    sample_rate: u32,
}

impl AudioPtsClock {
    /// Starts a timeline at `start_pts_us`.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate` is zero.
    #[must_use]
    #[inline]
    pub fn new(start_pts_us: u64, sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "sample rate must be non-zero");

        Self { next_pts_us: start_pts_us, sample_rate }
    }

    /// Starts a timeline at the current time of `clock`.
    #[must_use]
    #[inline]
    pub fn starting_now(clock: &dyn Clock, sample_rate: u32) -> Self {
        Self::new(clock.now_us(), sample_rate)
    }

    /// Returns the PTS for a chunk of `frames` per-channel sample frames and advances the
    /// timeline past it.
    #[inline]
    pub fn stamp(&mut self, frames: u32) -> u64 {
        let pts = self.next_pts_us;
        self.next_pts_us = pts.saturating_add(Self::duration_us(frames, self.sample_rate));
        pts
    }

    /// PTS the next chunk will receive.
    #[must_use]
    #[inline]
    pub const fn next_pts_us(&self) -> u64 {
        self.next_pts_us
    }

    /// Duration of `frames` sample frames at `sample_rate`, truncated to whole microseconds.
    #[must_use]
    #[inline]
    pub const fn duration_us(frames: u32, sample_rate: u32) -> u64 {
        frames as u64 * 1_000_000 / sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let mut last = clock.now_us();
        for _ in 0..1000 {
            let now = clock.now_us();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn audio_pts_accumulates_per_chunk() {
        let p0 = 5_000_000;
        let rate = 44_100;
        let frames = [1024, 1024, 512, 7, 1024, 0, 2048];

        let mut clock = AudioPtsClock::new(p0, rate);
        let mut expected = p0;
        let mut last = 0;
        for &f in &frames {
            let pts = clock.stamp(f);
            assert_eq!(pts, expected);
            assert!(pts >= last);
            last = pts;
            expected += u64::from(f) * 1_000_000 / u64::from(rate);
        }
        assert_eq!(clock.next_pts_us(), expected);
    }

    #[test]
    fn audio_chunk_of_1024_frames_at_48k() {
        assert_eq!(AudioPtsClock::duration_us(1024, 48_000), 21_333);
        assert_eq!(AudioPtsClock::duration_us(960, 48_000), 20_000);
    }

    #[test]
    fn starting_now_samples_the_clock_once() {
        let manual = ManualClock::new(123);
        let mut pts = AudioPtsClock::starting_now(&manual, 48_000);
        manual.advance(1_000_000);

        assert_eq!(pts.stamp(480), 123);
        assert_eq!(pts.stamp(480), 10_123);
    }
}

//! Software stand-ins for the capture devices and the hardware encoder.
//!
//! These drive the pipeline without any hardware: a moving NV12 test pattern, a sine tone
//! and an encoder that frames its output as H.264 Annex-B NAL units. Sources are paced in
//! real time (optionally sped up) and can be made finite, which the tests rely on.
use std::f64::consts::TAU;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

use crate::capture::{AudioRead, AudioSource, CaptureError, Dequeued, VideoSource};
use crate::clock::{AudioPtsClock, ManualClock};
use crate::encoder::{EncodeError, EncodedChunk, VideoEncoder, VideoSettings};
use crate::frame::{AudioFormat, VideoFormat, VideoFrame};

/// Device name that selects the synthetic backends.
pub const SYNTHETIC_DEVICE: &str = "synthetic";

const START_CODE: [u8; 4] = [0, 0, 0, 1];
const NAL_SPS: u8 = 0x67;
const NAL_PPS: u8 = 0x68;
const NAL_IDR: u8 = 0x65;
const NAL_SLICE: u8 = 0x41;

fn check_device(device: &str) -> Result<(), CaptureError> {
    if device == SYNTHETIC_DEVICE {
        Ok(())
    } else {
        Err(CaptureError::Open {
            device: device.to_string(),
            reason: format!("no capture backend for this device, use \"{SYNTHETIC_DEVICE}\""),
        })
    }
}

/// Fixed-cadence scheduler. Deadlines advance by whole intervals so pacing never drifts.
#[derive(Debug)]
struct Pacer {
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl Pacer {
    fn new(period: Duration, speed: f64) -> Self {
        let interval =
            (speed.is_finite() && speed > 0.0).then(|| period.div_f64(speed));
        Self { interval, next_due: None }
    }

    fn due(&mut self) -> Option<Instant> {
        let interval = self.interval?;
        let due = *self.next_due.get_or_insert_with(Instant::now);
        self.next_due = Some(due + interval);
        Some(due)
    }

    /// Non-blocking: `true` if the next item is due now.
    fn ready(&mut self) -> bool {
        match (self.interval, self.next_due) {
            (Some(_), Some(due)) if Instant::now() < due => false,
            _ => {
                self.due();
                true
            }
        }
    }

    /// Blocks until the next item is due.
    fn wait(&mut self) {
        if let Some(due) = self.due() {
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
    }
}

fn period_of(rate_hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / rate_hz)
}

/// Moving NV12 test pattern delivered at a fixed frame rate.
pub struct TestPatternSource {
    format: VideoFormat,
    frame_rate: u32,
    buffer: Vec<u8>,
    pacer: Pacer,
    sequence: u32,
    produced: u64,
    frame_limit: Option<u64>,
    gap_every: Option<u64>,
    simulated_clock: Option<Arc<ManualClock>>,
}

impl TestPatternSource {
    /// Opens the synthetic video device. Any other device name fails.
    #[inline]
    pub fn open(device: &str, format: VideoFormat, frame_rate: u32) -> Result<Self, CaptureError> {
        check_device(device)?;
        Ok(Self::new(format, frame_rate))
    }

    #[must_use]
    #[inline]
    pub fn new(format: VideoFormat, frame_rate: u32) -> Self {
        let frame_rate = frame_rate.max(1);
        Self {
            format,
            frame_rate,
            buffer: vec![0; format.frame_size()],
            pacer: Pacer::new(period_of(f64::from(frame_rate)), 1.0),
            sequence: 0,
            produced: 0,
            frame_limit: None,
            gap_every: None,
            simulated_clock: None,
        }
    }

    /// Delivers frames `speed` times faster than real time. A non-positive or non-finite
    /// speed disables pacing entirely.
    #[must_use]
    #[inline]
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.pacer = Pacer::new(period_of(f64::from(self.frame_rate)), speed);
        self
    }

    /// Reports end of stream after `frames` frames.
    #[must_use]
    #[inline]
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Skips one hardware sequence number after every `every` frames, as a driver that
    /// lost a buffer would.
    #[must_use]
    #[inline]
    pub fn with_sequence_gaps(mut self, every: u64) -> Self {
        self.gap_every = Some(every);
        self
    }

    /// Advances `clock` by one frame period for every delivered frame.
    #[must_use]
    #[inline]
    pub fn with_simulated_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.simulated_clock = Some(clock);
        self
    }

    fn render(&mut self) {
        let stride = self.format.stride as usize;
        let width = self.format.width as usize;
        let luma_len = stride * self.format.height as usize;
        let shift = (self.produced % 256) as usize;

        let (luma, chroma) = self.buffer.split_at_mut(luma_len);
        luma.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            for (x, px) in row.iter_mut().take(width).enumerate() {
                *px = ((x + y + shift) & 0xff) as u8;
            }
        });
        chroma.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            for (x, px) in row.iter_mut().take(width).enumerate() {
                *px = if x % 2 == 0 { 128 } else { ((y * 2 + shift) & 0xff) as u8 };
            }
        });
    }
}

impl VideoSource for TestPatternSource {
    fn format(&self) -> VideoFormat {
        self.format
    }

    fn dequeue(&mut self) -> Result<Dequeued<'_>, CaptureError> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(Dequeued::End);
        }
        if !self.pacer.ready() {
            return Ok(Dequeued::NoData);
        }

        if self.produced > 0 {
            if let Some(clock) = &self.simulated_clock {
                clock.advance(1_000_000 / u64::from(self.frame_rate));
            }
            let skip = self.gap_every.is_some_and(|every| every > 0 && self.produced % every == 0);
            self.sequence = self.sequence.wrapping_add(if skip { 2 } else { 1 });
        }

        self.render();
        self.produced += 1;

        Ok(Dequeued::Frame { data: &self.buffer, sequence: self.sequence })
    }
}

/// Sine tone delivered one period at a time, like a blocking PCM device.
pub struct ToneSource {
    format: AudioFormat,
    frequency: f64,
    pacer: Pacer,
    sample_index: u64,
    periods_read: u64,
    period_limit: Option<u64>,
}

impl ToneSource {
    /// Opens the synthetic audio device. Any other device name fails.
    #[inline]
    pub fn open(device: &str, format: AudioFormat) -> Result<Self, CaptureError> {
        check_device(device)?;
        Ok(Self::new(format))
    }

    /// # Panics
    ///
    /// Panics if the format has a zero sample rate or non-16-bit samples.
    #[must_use]
    #[inline]
    pub fn new(format: AudioFormat) -> Self {
        assert!(format.sample_rate > 0, "sample rate must be non-zero");
        assert_eq!(format.bytes_per_sample, 2, "ToneSource only produces S16LE");

        let period_us = AudioPtsClock::duration_us(format.frames_per_period, format.sample_rate);
        Self {
            format,
            frequency: 440.0,
            pacer: Pacer::new(Duration::from_micros(period_us), 1.0),
            sample_index: 0,
            periods_read: 0,
            period_limit: None,
        }
    }

    #[must_use]
    #[inline]
    pub const fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Delivers periods `speed` times faster than real time. A non-positive or non-finite
    /// speed disables pacing entirely.
    #[must_use]
    #[inline]
    pub fn with_speed(mut self, speed: f64) -> Self {
        let period_us =
            AudioPtsClock::duration_us(self.format.frames_per_period, self.format.sample_rate);
        self.pacer = Pacer::new(Duration::from_micros(period_us), speed);
        self
    }

    /// Reports end of stream after `periods` reads.
    #[must_use]
    #[inline]
    pub const fn with_period_limit(mut self, periods: u64) -> Self {
        self.period_limit = Some(periods);
        self
    }
}

impl AudioSource for ToneSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn read(&mut self, buffer: &mut [u8]) -> Result<AudioRead, CaptureError> {
        if self.period_limit.is_some_and(|limit| self.periods_read >= limit) {
            return Ok(AudioRead::End);
        }
        self.pacer.wait();

        let bytes_per_frame = self.format.bytes_per_frame();
        let frames = (buffer.len() / bytes_per_frame).min(self.format.frames_per_period as usize);
        let rate = f64::from(self.format.sample_rate);

        for frame in buffer.chunks_exact_mut(bytes_per_frame).take(frames) {
            let t = self.sample_index as f64 / rate;
            let sample = ((TAU * self.frequency * t).sin() * f64::from(i16::MAX / 4)) as i16;
            for channel in frame.chunks_exact_mut(2) {
                channel.copy_from_slice(&sample.to_le_bytes());
            }
            self.sample_index += 1;
        }
        self.periods_read += 1;

        Ok(AudioRead::Frames(u32::try_from(frames).unwrap_or(u32::MAX)))
    }
}

/// Encoder stand-in that emits Annex-B framed NAL units sized to the target bitrate.
///
/// Keyframes carry SPS, PPS and an IDR slice; other frames a single non-IDR slice. Payload
/// bytes are sampled from the luma plane with the high bit set, so no start code can
/// appear inside a NAL unit. The output is well-formed framing, not decodable video.
pub struct AnnexBEncoder {
    settings: VideoSettings,
    frames_in: u64,
}

impl AnnexBEncoder {
    #[must_use]
    #[inline]
    pub const fn new(settings: VideoSettings) -> Self {
        Self { settings, frames_in: 0 }
    }

    fn push_nal(out: &mut Vec<u8>, header: u8, payload: impl IntoIterator<Item = u8>) {
        out.extend_from_slice(&START_CODE);
        out.push(header);
        out.extend(payload);
    }
}

impl VideoEncoder for AnnexBEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Option<EncodedChunk>, EncodeError> {
        let expected = VideoFormat::nv12(self.settings.width, self.settings.height).frame_size();
        if frame.len() < expected {
            return Err(EncodeError::FrameSize { expected, actual: frame.len() });
        }

        let is_keyframe = self.frames_in % u64::from(self.settings.keyframe_interval.max(1)) == 0;
        self.frames_in += 1;

        let payload_len = self.settings.bytes_per_frame().max(1);
        let step = (expected / payload_len).max(1);
        let payload = frame.data.iter().step_by(step).take(payload_len).map(|b| b | 0x80);

        let mut out = Vec::with_capacity(payload_len + 32);
        if is_keyframe {
            let [w0, w1] = u16::try_from(self.settings.width).unwrap_or(u16::MAX).to_be_bytes();
            let [h0, h1] = u16::try_from(self.settings.height).unwrap_or(u16::MAX).to_be_bytes();
            Self::push_nal(&mut out, NAL_SPS, [0x42, 0x80, 0x1f, w0 | 0x80, w1 | 0x80, h0 | 0x80, h1 | 0x80]);
            Self::push_nal(&mut out, NAL_PPS, [0xce, 0x3c, 0x80]);
            Self::push_nal(&mut out, NAL_IDR, payload);
        } else {
            Self::push_nal(&mut out, NAL_SLICE, payload);
        }

        Ok(Some(EncodedChunk { data: out, is_keyframe }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::encoder::VideoSettingsBuilder;

    fn frame(format: VideoFormat, data: Vec<u8>) -> VideoFrame {
        VideoFrame {
            data,
            width: format.width,
            height: format.height,
            stride: format.stride,
            pts_us: 0,
            frame_id: 0,
        }
    }

    #[test]
    fn unknown_device_fails_to_open() {
        let err = TestPatternSource::open("/dev/video0", VideoFormat::nv12(64, 48), 30).err();
        assert!(matches!(err, Some(CaptureError::Open { .. })));
        assert!(ToneSource::open("hw:0,0", AudioFormat::s16le(48_000, 2, 1024)).is_err());
    }

    #[test]
    fn pattern_source_honours_limit_and_gaps() {
        let mut source = TestPatternSource::new(VideoFormat::nv12(64, 48), 30)
            .with_speed(0.0)
            .with_frame_limit(5)
            .with_sequence_gaps(2);

        let mut sequences = Vec::new();
        loop {
            match source.dequeue().unwrap() {
                Dequeued::Frame { data, sequence } => {
                    assert_eq!(data.len(), 64 * 48 * 3 / 2);
                    sequences.push(sequence);
                }
                Dequeued::NoData => {}
                Dequeued::End => break,
            }
        }
        assert_eq!(sequences, vec![0, 1, 3, 4, 6]);
    }

    #[test]
    fn simulated_clock_advances_per_frame() {
        let clock = Arc::new(ManualClock::new(0));
        let mut source = TestPatternSource::new(VideoFormat::nv12(16, 16), 30)
            .with_speed(0.0)
            .with_simulated_clock(clock.clone());

        for _ in 0..4 {
            assert!(matches!(source.dequeue().unwrap(), Dequeued::Frame { .. }));
        }
        assert_eq!(clock.now_us(), 3 * 33_333);
    }

    #[test]
    fn tone_source_fills_one_period() {
        let format = AudioFormat::s16le(48_000, 2, 1024);
        let mut source = ToneSource::new(format).with_speed(0.0).with_period_limit(2);
        let mut buffer = vec![0; format.period_bytes()];

        assert_eq!(source.read(&mut buffer).unwrap(), AudioRead::Frames(1024));
        assert!(buffer.iter().any(|&b| b != 0));
        assert_eq!(source.read(&mut buffer).unwrap(), AudioRead::Frames(1024));
        assert_eq!(source.read(&mut buffer).unwrap(), AudioRead::End);
    }

    #[test]
    fn encoder_emits_keyframes_on_interval() {
        let format = VideoFormat::nv12(64, 48);
        let settings = VideoSettingsBuilder::new(64, 48)
            .frame_rate(30)
            .bitrate(240_000)
            .keyframe_interval(3)
            .build()
            .unwrap();
        let mut encoder = AnnexBEncoder::new(settings);
        let input = frame(format, vec![7; format.frame_size()]);

        let keys: Vec<bool> = (0..6)
            .map(|_| encoder.encode(&input).unwrap().unwrap().is_keyframe)
            .collect();
        assert_eq!(keys, vec![true, false, false, true, false, false]);

        // Seventh frame opens the next group of pictures.
        let key = encoder.encode(&input).unwrap().unwrap();
        assert!(key.is_keyframe);
        assert_eq!(&key.data[..5], &[0, 0, 0, 1, NAL_SPS]);
        assert_eq!(key.data.len(), 12 + 8 + 5 + 1000);

        let slice = encoder.encode(&input).unwrap().unwrap();
        assert!(!slice.is_keyframe);
        assert_eq!(&slice.data[..5], &[0, 0, 0, 1, NAL_SLICE]);
        assert_eq!(slice.data.len(), 5 + 1000);
    }

    #[test]
    fn encoder_rejects_short_frame() {
        let settings = VideoSettingsBuilder::new(64, 48).build().unwrap();
        let mut encoder = AnnexBEncoder::new(settings);
        let short = frame(VideoFormat::nv12(64, 48), vec![0; 10]);
        assert!(matches!(encoder.encode(&short), Err(EncodeError::FrameSize { .. })));
    }
}

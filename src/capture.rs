//! Contracts for the video and audio capture devices feeding the pipeline.
//!
//! Devices are opened outside the pipeline core and handed in as trait objects. The core
//! only relies on what they hand over per call: a borrowed hardware buffer plus its
//! sequence number for video, and a count of sample frames for audio.
use crate::frame::{AudioFormat, VideoFormat};

/// Used to handle capture device errors.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open capture device {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("Capture device read failed: {0}")]
    Read(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of one attempt to dequeue a video buffer.
#[derive(Debug)]
pub enum Dequeued<'a> {
    /// A filled buffer. The slice stays valid until the next call on the source, which
    /// returns the hardware buffer to the driver.
    Frame { data: &'a [u8], sequence: u32 },
    /// Nothing ready yet, poll again soon.
    NoData,
    /// The device will produce no more frames.
    End,
}

/// An already-open video capture device.
pub trait VideoSource: Send {
    /// Geometry of the frames this source delivers.
    fn format(&self) -> VideoFormat;

    /// Dequeues the next filled buffer without blocking for long.
    fn dequeue(&mut self) -> Result<Dequeued<'_>, CaptureError>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    #[inline]
    fn format(&self) -> VideoFormat {
        (**self).format()
    }

    #[inline]
    fn dequeue(&mut self) -> Result<Dequeued<'_>, CaptureError> {
        (**self).dequeue()
    }
}

/// Result of one audio read.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum AudioRead {
    /// Per-channel sample frames written to the front of the buffer. May be fewer than
    /// requested, or zero when nothing was ready.
    Frames(u32),
    /// The device will produce no more audio.
    End,
}

/// An already-open audio capture device.
pub trait AudioSource: Send {
    fn format(&self) -> AudioFormat;

    /// Reads interleaved PCM into `buffer`, which holds exactly one period.
    fn read(&mut self, buffer: &mut [u8]) -> Result<AudioRead, CaptureError>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    #[inline]
    fn format(&self) -> AudioFormat {
        (**self).format()
    }

    #[inline]
    fn read(&mut self, buffer: &mut [u8]) -> Result<AudioRead, CaptureError> {
        (**self).read(buffer)
    }
}

/// Detects frames the capture hardware skipped before they reached the pipeline.
///
/// Sequence numbers should increase by one per buffer; a jump from `n` to `n + k` means
/// `k - 1` frames were lost in the driver. A backwards jump (stream restart) resets the
/// tracker without reporting drops.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceTracker {
    last: Option<u32>,
}

impl SequenceTracker {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Feeds the sequence number of the buffer just dequeued and returns how many frames
    /// were skipped since the previous one.
    #[inline]
    pub fn observe(&mut self, sequence: u32) -> u64 {
        let skipped = match self.last {
            Some(last) if sequence > last => u64::from(sequence - last - 1),
            _ => 0,
        };
        self.last = Some(sequence);
        skipped
    }
}

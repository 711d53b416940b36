//! Contract for the video encoder and the settings used to configure one.
use crate::frame::VideoFrame;

/// Used to handle encoder errors.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("Failed to initialize encoder: {0}")]
    Init(String),
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },
    #[error("Encoder rejected frame: {0}")]
    Rejected(String),
}

/// Bitstream produced for one input frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// An already-initialized video encoder.
///
/// The pipeline only depends on this hand-off: raw frame in, at most one packet out. The
/// caller attaches the source frame's PTS to the packet; encoders never re-stamp time.
pub trait VideoEncoder: Send {
    /// Encodes one frame. `Ok(None)` means the encoder has no packet yet, not an error.
    fn encode(&mut self, frame: &VideoFrame) -> Result<Option<EncodedChunk>, EncodeError>;
}

impl<E: VideoEncoder + ?Sized> VideoEncoder for Box<E> {
    #[inline]
    fn encode(&mut self, frame: &VideoFrame) -> Result<Option<EncodedChunk>, EncodeError> {
        (**self).encode(frame)
    }
}

/// Builder for configuring video encoder settings.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct VideoSettingsBuilder {
    width: u32,
    height: u32,
    frame_rate: u32,
    bitrate: u32,
    keyframe_interval: u32,
}

impl VideoSettingsBuilder {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height, frame_rate: 30, bitrate: 2_000_000, keyframe_interval: 30 }
    }

    #[must_use]
    pub const fn width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }
    #[must_use]
    pub const fn height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }
    #[must_use]
    pub const fn frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }
    #[must_use]
    pub const fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }
    /// Frames between keyframes; one keyframe per second by default.
    #[must_use]
    pub const fn keyframe_interval(mut self, keyframe_interval: u32) -> Self {
        self.keyframe_interval = keyframe_interval;
        self
    }

    /// Validates the settings.
    pub fn build(self) -> Result<VideoSettings, EncodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::Init(format!("invalid size {}x{}", self.width, self.height)));
        }
        if self.frame_rate == 0 {
            return Err(EncodeError::Init(String::from("frame rate must be non-zero")));
        }

        Ok(VideoSettings {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            bitrate: self.bitrate,
            keyframe_interval: self.keyframe_interval.max(1),
        })
    }
}

/// Validated encoder settings.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate: u32,
    pub keyframe_interval: u32,
}

impl VideoSettings {
    /// Average bytes per frame needed to hit the target bitrate.
    #[must_use]
    #[inline]
    pub const fn bytes_per_frame(&self) -> usize {
        (self.bitrate / 8 / self.frame_rate) as usize
    }
}

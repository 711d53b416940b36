//! Command line configuration for the recorder binary.
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::encoder::{EncodeError, VideoSettings, VideoSettingsBuilder};
use crate::frame::{AudioFormat, VideoFormat};
use crate::sink::SinkKind;
use crate::synthetic::SYNTHETIC_DEVICE;

pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_BITRATE: u32 = 2_000_000;
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_CHANNELS: u16 = 2;
pub const DEFAULT_PERIOD_FRAMES: u32 = 1024;

/// Used to handle configuration errors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid capture size {0}: width and height must be positive")]
    InvalidSize(FrameSize),
    #[error("Invalid encoder settings: {0}")]
    Encoder(#[from] EncodeError),
}

/// Capture resolution given as `WxH`.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WxH, got {s}"))?;
        let width = w.trim().parse().map_err(|_| format!("invalid width in {s}"))?;
        let height = h.trim().parse().map_err(|_| format!("invalid height in {s}"))?;

        Ok(Self { width, height })
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Parser, Clone, Debug)]
#[command(name = "av-recorder")]
#[command(version)]
#[command(about = "Captures video and audio, encodes the video and writes both streams to disk")]
pub struct AppConfig {
    /// Video capture device
    #[arg(long, default_value = SYNTHETIC_DEVICE)]
    pub video_dev: String,

    /// Capture size as WxH
    #[arg(long, default_value = "1280x720")]
    pub size: FrameSize,

    /// Capture frame rate, 0 falls back to 30
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: u32,

    /// H.264 target bitrate in bits per second, 0 falls back to 2000000
    #[arg(long, default_value_t = DEFAULT_BITRATE)]
    pub bitrate: u32,

    /// Audio capture device
    #[arg(long, default_value = SYNTHETIC_DEVICE)]
    pub audio_dev: String,

    /// Audio sample rate in Hz, 0 falls back to 48000
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sr: u32,

    /// Audio channel count, 0 falls back to 2
    #[arg(long, default_value_t = DEFAULT_CHANNELS)]
    pub ch: u16,

    /// Audio frames per read, 0 falls back to 1024
    #[arg(long, default_value_t = DEFAULT_PERIOD_FRAMES)]
    pub period: u32,

    /// Recording duration in seconds, 0 records until interrupted
    #[arg(long, default_value_t = 10)]
    pub sec: u64,

    /// H.264 elementary stream output file
    #[arg(long, default_value = "out.h264")]
    pub out_h264: PathBuf,

    /// Interleaved S16LE PCM output file
    #[arg(long, default_value = "out.pcm")]
    pub out_pcm: PathBuf,

    /// Output sink type: file or null
    #[arg(long, default_value = "file")]
    pub sink: SinkKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video_dev: String::from(SYNTHETIC_DEVICE),
            size: FrameSize { width: 1280, height: 720 },
            fps: DEFAULT_FPS,
            bitrate: DEFAULT_BITRATE,
            audio_dev: String::from(SYNTHETIC_DEVICE),
            sr: DEFAULT_SAMPLE_RATE,
            ch: DEFAULT_CHANNELS,
            period: DEFAULT_PERIOD_FRAMES,
            sec: 10,
            out_h264: PathBuf::from("out.h264"),
            out_pcm: PathBuf::from("out.pcm"),
            sink: SinkKind::File,
        }
    }
}

impl AppConfig {
    /// Replaces zero rates and counts with their defaults and rejects an empty frame size.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(ConfigError::InvalidSize(self.size));
        }
        if self.fps == 0 {
            self.fps = DEFAULT_FPS;
        }
        if self.bitrate == 0 {
            self.bitrate = DEFAULT_BITRATE;
        }
        if self.sr == 0 {
            self.sr = DEFAULT_SAMPLE_RATE;
        }
        if self.ch == 0 {
            self.ch = DEFAULT_CHANNELS;
        }
        if self.period == 0 {
            self.period = DEFAULT_PERIOD_FRAMES;
        }

        Ok(self)
    }

    #[must_use]
    #[inline]
    pub const fn video_format(&self) -> VideoFormat {
        VideoFormat::nv12(self.size.width, self.size.height)
    }

    #[must_use]
    #[inline]
    pub const fn audio_format(&self) -> AudioFormat {
        AudioFormat::s16le(self.sr, self.ch, self.period)
    }

    /// Encoder settings with one keyframe per second.
    #[inline]
    pub fn video_settings(&self) -> Result<VideoSettings, ConfigError> {
        Ok(VideoSettingsBuilder::new(self.size.width, self.size.height)
            .frame_rate(self.fps)
            .bitrate(self.bitrate)
            .keyframe_interval(self.fps)
            .build()?)
    }

    /// `None` when recording until interrupted.
    #[must_use]
    #[inline]
    pub const fn duration(&self) -> Option<Duration> {
        if self.sec == 0 { None } else { Some(Duration::from_secs(self.sec)) }
    }

    /// One line describing the effective configuration.
    #[must_use]
    pub fn summary(&self) -> String {
        let duration = if self.sec == 0 { String::from("until-signal") } else { format!("{}s", self.sec) };
        format!(
            "[CFG] video={} {} @{}fps {}bps | audio={} {}Hz {}ch period={} | sink={:?} h264={} pcm={} | duration={}",
            self.video_dev,
            self.size,
            self.fps,
            self.bitrate,
            self.audio_dev,
            self.sr,
            self.ch,
            self.period,
            self.sink,
            self.out_h264.display(),
            self.out_pcm.display(),
            duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli() {
        let parsed = AppConfig::try_parse_from(["av-recorder"]).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(parsed.size, defaults.size);
        assert_eq!(parsed.fps, 30);
        assert_eq!(parsed.bitrate, 2_000_000);
        assert_eq!(parsed.sr, 48_000);
        assert_eq!(parsed.ch, 2);
        assert_eq!(parsed.sec, 10);
        assert_eq!(parsed.sink, SinkKind::File);
        assert_eq!(parsed.out_h264, PathBuf::from("out.h264"));
    }

    #[test]
    fn parses_flags() {
        let cfg = AppConfig::try_parse_from([
            "av-recorder",
            "--size",
            "1920x1080",
            "--fps",
            "25",
            "--sink",
            "null",
            "--sec",
            "0",
        ])
        .unwrap();
        assert_eq!(cfg.size, FrameSize { width: 1920, height: 1080 });
        assert_eq!(cfg.fps, 25);
        assert_eq!(cfg.sink, SinkKind::Null);
        assert_eq!(cfg.duration(), None);
    }

    #[test]
    fn malformed_size_is_rejected_by_parser() {
        assert!(AppConfig::try_parse_from(["av-recorder", "--size", "1280"]).is_err());
        assert!(AppConfig::try_parse_from(["av-recorder", "--size", "-1x720"]).is_err());
    }

    #[test]
    fn validate_applies_fallbacks() {
        let cfg = AppConfig { fps: 0, bitrate: 0, sr: 0, ch: 0, period: 0, ..AppConfig::default() }
            .validate()
            .unwrap();
        assert_eq!(cfg.fps, DEFAULT_FPS);
        assert_eq!(cfg.bitrate, DEFAULT_BITRATE);
        assert_eq!(cfg.sr, DEFAULT_SAMPLE_RATE);
        assert_eq!(cfg.ch, DEFAULT_CHANNELS);
        assert_eq!(cfg.period, DEFAULT_PERIOD_FRAMES);
    }

    #[test]
    fn validate_rejects_zero_size() {
        let cfg = AppConfig { size: FrameSize { width: 0, height: 720 }, ..AppConfig::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidSize(_))));
    }

    #[test]
    fn summary_mentions_effective_values() {
        let summary = AppConfig::default().summary();
        assert!(summary.starts_with("[CFG] video=synthetic 1280x720 @30fps"));
        assert!(summary.ends_with("duration=10s"));
    }
}

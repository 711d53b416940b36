//! # AV Recorder
//!
//! **AV Recorder** captures video and audio on independent threads, encodes the
//! video to H.264 and writes both streams to disk. Threads only talk through
//! bounded queues, so a slow disk or encoder applies backpressure instead of
//! growing memory, and every frame carries a monotonic presentation timestamp.
//!
//! ## Features
//!
//! - Bounded Blocking Queues With A Close/Drain Protocol.
//! - Drop Accounting For Full Queues, Failed Allocations And Hardware Gaps.
//! - Sample-Accurate Audio Timestamps.
//! - Idempotent Shutdown From Any Thread, Timer Or Ctrl-C.
//!
//! ## Usage
//!
//! ```no_run
//! use av_recorder::{
//!     encoder::VideoSettingsBuilder,
//!     frame::{AudioFormat, VideoFormat},
//!     pipeline::Pipeline,
//!     sink::FileSink,
//!     synthetic::{AnnexBEncoder, TestPatternSource, ToneSource},
//! };
//! use std::time::Duration;
//!
//! let settings = VideoSettingsBuilder::new(1280, 720).frame_rate(30).build().unwrap();
//!
//! let report = Pipeline::builder()
//!     .video_source(|| Ok(TestPatternSource::new(VideoFormat::nv12(1280, 720), 30)))
//!     .encoder(move || Ok(AnnexBEncoder::new(settings)))
//!     .audio_source(|| Ok(ToneSource::new(AudioFormat::s16le(48_000, 2, 1024))))
//!     .video_sink(|| FileSink::create("out.h264"))
//!     .audio_sink(|| FileSink::create("out.pcm"))
//!     .duration(Some(Duration::from_secs(10)))
//!     .build()
//!     .unwrap()
//!     .run()
//!     .unwrap();
//!
//! println!("{} drops", report.totals.drops);
//! ```
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::inconsistent_struct_constructor)]
#![warn(clippy::must_use_candidate)]
#![warn(clippy::ptr_as_ptr)]
#![warn(clippy::borrow_as_ptr)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]

pub mod capture;
pub mod clock;
pub mod config;
pub mod encoder;
pub mod frame;
pub mod pipeline;
pub mod queue;
pub mod shutdown;
pub mod sink;
pub mod stats;
pub mod synthetic;

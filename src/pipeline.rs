//! Thread topology wiring capture, encode and sinks together through bounded queues.
//!
//! ```text
//! video-capture --RawVideoQueue(8)--> video-encode --H264Queue(64)--> video-sink
//! audio-capture --AudioQueue(256)-------------------------------------> audio-sink
//! ```
//!
//! Each role runs on its own named thread and only talks to its neighbours through a
//! queue. A role closes its own output queue when it exits, so a finite source drains
//! through the whole chain on its own. A [`Shutdown`] request closes every queue at once.
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::capture::{AudioRead, AudioSource, CaptureError, Dequeued, SequenceTracker, VideoSource};
use crate::clock::{AudioPtsClock, Clock, MonotonicClock};
use crate::config::ConfigError;
use crate::encoder::{EncodeError, VideoEncoder};
use crate::frame::{self, AudioChunk, EncodedPacket, VideoFrame};
use crate::queue::{BoundedQueue, Close, TryPushError};
use crate::shutdown::{self, Shutdown};
use crate::sink::{Sink, SinkError};
use crate::stats::{AvStats, PtsDeltaTracker, PtsDeltas, QueueDepth, StatsTotals, StatsWindow, StatusLine};

/// Raw frames are large and must stay fresh, so only a few are buffered.
pub const RAW_VIDEO_CAPACITY: usize = 8;
pub const ENCODED_VIDEO_CAPACITY: usize = 64;
pub const AUDIO_CAPACITY: usize = 256;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One of the pipeline's threads.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Role {
    VideoCapture,
    VideoEncode,
    AudioCapture,
    VideoSink,
    AudioSink,
    Stats,
}

impl Role {
    #[must_use]
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::VideoCapture => "video-capture",
            Self::VideoEncode => "video-encode",
            Self::AudioCapture => "audio-capture",
            Self::VideoSink => "video-sink",
            Self::AudioSink => "audio-sink",
            Self::Stats => "stats",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Used to handle pipeline errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No {0} collaborator was provided")]
    MissingCollaborator(Role),
    #[error("Failed to spawn {role} thread: {source}")]
    Spawn { role: Role, source: io::Error },
    #[error("{0} thread panicked")]
    RolePanicked(Role),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Shutdown(#[from] shutdown::Error),
}

/// Why a run ended.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum StopReason {
    /// Every source reached end of stream and everything drained.
    Drained,
    /// Shutdown was requested from outside the roles (timer, signal, caller).
    Requested,
    /// A role hit a fatal error and requested shutdown.
    Failed(Role),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drained => f.write_str("drained"),
            Self::Requested => f.write_str("requested"),
            Self::Failed(role) => write!(f, "{role} failed"),
        }
    }
}

/// What one sink wrote during a run.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub struct SinkSummary {
    pub items: u64,
    pub bytes: u64,
    pub keyframes: u64,
    pub first_pts_us: Option<u64>,
    pub last_pts_us: Option<u64>,
}

impl SinkSummary {
    #[inline]
    fn record(&mut self, bytes: usize, pts_us: u64, is_keyframe: bool) {
        self.items += 1;
        self.bytes += bytes as u64;
        self.keyframes += u64::from(is_keyframe);
        self.first_pts_us.get_or_insert(pts_us);
        self.last_pts_us = Some(pts_us);
    }

    /// Mean gap between consecutive written items, in microseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_pts_delta_us(&self) -> Option<f64> {
        let (first, last) = (self.first_pts_us?, self.last_pts_us?);
        (self.items > 1).then(|| (last - first) as f64 / (self.items - 1) as f64)
    }
}

/// Outcome of [`Pipeline::run`].
#[derive(Clone, Copy, Debug)]
pub struct PipelineReport {
    /// Sum of every stats window, including the partial one drained at the end.
    pub totals: StatsTotals,
    pub video: SinkSummary,
    pub audio: SinkSummary,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

/// The three queues connecting the roles.
#[derive(Debug)]
pub struct PipelineQueues {
    pub raw_video: Arc<BoundedQueue<VideoFrame>>,
    pub encoded_video: Arc<BoundedQueue<EncodedPacket>>,
    pub audio: Arc<BoundedQueue<AudioChunk>>,
}

impl PipelineQueues {
    /// Creates the queues at their fixed capacities and registers them with `shutdown`.
    #[must_use]
    pub fn new(shutdown: &Shutdown) -> Self {
        let queues = Self {
            raw_video: Arc::new(BoundedQueue::new(RAW_VIDEO_CAPACITY)),
            encoded_video: Arc::new(BoundedQueue::new(ENCODED_VIDEO_CAPACITY)),
            audio: Arc::new(BoundedQueue::new(AUDIO_CAPACITY)),
        };
        shutdown.register(queues.raw_video.clone());
        shutdown.register(queues.encoded_video.clone());
        shutdown.register(queues.audio.clone());

        queues
    }

    fn depth<T>(queue: &BoundedQueue<T>) -> QueueDepth {
        QueueDepth { size: queue.size(), capacity: queue.capacity() }
    }
}

type Open<T, E> = Box<dyn FnOnce() -> Result<T, E> + Send>;

/// Configures a [`Pipeline`].
///
/// Collaborators are given as constructors. Each one runs on its role's thread, so a
/// device that fails to open takes down only that role, which then stops the pipeline.
pub struct PipelineBuilder {
    video_source: Option<Open<Box<dyn VideoSource>, CaptureError>>,
    encoder: Option<Open<Box<dyn VideoEncoder>, EncodeError>>,
    audio_source: Option<Open<Box<dyn AudioSource>, CaptureError>>,
    video_sink: Option<Open<Box<dyn Sink>, SinkError>>,
    audio_sink: Option<Open<Box<dyn Sink>, SinkError>>,
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
    stats_interval: Duration,
    duration: Option<Duration>,
}

impl PipelineBuilder {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            video_source: None,
            encoder: None,
            audio_source: None,
            video_sink: None,
            audio_sink: None,
            clock: Arc::new(MonotonicClock::new()),
            shutdown: Shutdown::new(),
            stats_interval: Duration::from_secs(1),
            duration: None,
        }
    }

    #[must_use]
    #[inline]
    pub fn video_source<F, S>(mut self, open: F) -> Self
    where
        F: FnOnce() -> Result<S, CaptureError> + Send + 'static,
        S: VideoSource + 'static,
    {
        self.video_source = Some(Box::new(move || open().map(|s| Box::new(s) as Box<dyn VideoSource>)));
        self
    }

    #[must_use]
    #[inline]
    pub fn encoder<F, E>(mut self, open: F) -> Self
    where
        F: FnOnce() -> Result<E, EncodeError> + Send + 'static,
        E: VideoEncoder + 'static,
    {
        self.encoder = Some(Box::new(move || open().map(|e| Box::new(e) as Box<dyn VideoEncoder>)));
        self
    }

    #[must_use]
    #[inline]
    pub fn audio_source<F, S>(mut self, open: F) -> Self
    where
        F: FnOnce() -> Result<S, CaptureError> + Send + 'static,
        S: AudioSource + 'static,
    {
        self.audio_source = Some(Box::new(move || open().map(|s| Box::new(s) as Box<dyn AudioSource>)));
        self
    }

    #[must_use]
    #[inline]
    pub fn video_sink<F, S>(mut self, open: F) -> Self
    where
        F: FnOnce() -> Result<S, SinkError> + Send + 'static,
        S: Sink + 'static,
    {
        self.video_sink = Some(Box::new(move || open().map(|s| Box::new(s) as Box<dyn Sink>)));
        self
    }

    #[must_use]
    #[inline]
    pub fn audio_sink<F, S>(mut self, open: F) -> Self
    where
        F: FnOnce() -> Result<S, SinkError> + Send + 'static,
        S: Sink + 'static,
    {
        self.audio_sink = Some(Box::new(move || open().map(|s| Box::new(s) as Box<dyn Sink>)));
        self
    }

    /// Time source used to stamp video frames and the audio start.
    #[must_use]
    #[inline]
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Shares an existing shutdown handle instead of creating a new one.
    #[must_use]
    #[inline]
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    #[inline]
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Stops the run after `duration`. Without one the run lasts until the sources end or
    /// shutdown is requested.
    #[must_use]
    #[inline]
    pub fn duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Creates the queues. Nothing is opened or spawned until [`Pipeline::run`].
    pub fn build(self) -> Result<Pipeline, Error> {
        let collaborators = Collaborators {
            video_source: self.video_source.ok_or(Error::MissingCollaborator(Role::VideoCapture))?,
            encoder: self.encoder.ok_or(Error::MissingCollaborator(Role::VideoEncode))?,
            audio_source: self.audio_source.ok_or(Error::MissingCollaborator(Role::AudioCapture))?,
            video_sink: self.video_sink.ok_or(Error::MissingCollaborator(Role::VideoSink))?,
            audio_sink: self.audio_sink.ok_or(Error::MissingCollaborator(Role::AudioSink))?,
        };

        let queues = PipelineQueues::new(&self.shutdown);
        let shared = Arc::new(Shared {
            shutdown: self.shutdown,
            stats: AvStats::new(),
            deltas: PtsDeltas::new(),
            clock: self.clock,
            failure: Mutex::new(None),
        });

        Ok(Pipeline {
            collaborators,
            queues,
            shared,
            stats_interval: self.stats_interval,
            duration: self.duration,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Collaborators {
    video_source: Open<Box<dyn VideoSource>, CaptureError>,
    encoder: Open<Box<dyn VideoEncoder>, EncodeError>,
    audio_source: Open<Box<dyn AudioSource>, CaptureError>,
    video_sink: Open<Box<dyn Sink>, SinkError>,
    audio_sink: Open<Box<dyn Sink>, SinkError>,
}

/// State every role can see.
struct Shared {
    shutdown: Shutdown,
    stats: AvStats,
    deltas: PtsDeltas,
    clock: Arc<dyn Clock>,
    failure: Mutex<Option<Role>>,
}

impl Shared {
    /// Logs a fatal error for `role` and stops the pipeline.
    fn fail(&self, role: Role, err: &dyn fmt::Display) {
        error!("[{role}] {err}");
        self.stop_for(role);
    }

    /// Records the first failing role and stops the pipeline.
    fn stop_for(&self, role: Role) {
        self.failure.lock().get_or_insert(role);
        self.shutdown.request();
    }

    fn status_line(&self, window: StatsWindow, window_len: Duration, queues: &PipelineQueues) -> StatusLine {
        StatusLine {
            window,
            window_len,
            raw_video: PipelineQueues::depth(&queues.raw_video),
            encoded_video: PipelineQueues::depth(&queues.encoded_video),
            audio: PipelineQueues::depth(&queues.audio),
            video_pts_delta_us: self.deltas.video_us(),
            audio_pts_delta_us: self.deltas.audio_us(),
        }
    }
}

/// Closes a role's output queue when the role returns or unwinds.
struct CloseOnExit<Q: Close>(Arc<Q>);

impl<Q: Close> Drop for CloseOnExit<Q> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Stops the whole pipeline if the role thread holding it unwinds.
struct StopOnPanic {
    role: Role,
    shutdown: Shutdown,
}

impl Drop for StopOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("[{}] panicked, stopping pipeline", self.role);
            self.shutdown.request();
        }
    }
}

/// A built, not yet running pipeline.
pub struct Pipeline {
    collaborators: Collaborators,
    queues: PipelineQueues,
    shared: Arc<Shared>,
    stats_interval: Duration,
    duration: Option<Duration>,
}

impl Pipeline {
    #[must_use]
    #[inline]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Handle that stops this pipeline when requested.
    #[must_use]
    #[inline]
    pub fn shutdown(&self) -> Shutdown {
        self.shared.shutdown.clone()
    }

    #[must_use]
    #[inline]
    pub const fn queues(&self) -> &PipelineQueues {
        &self.queues
    }

    /// Runs every role to completion and returns what happened.
    ///
    /// Roles are joined captures first, then the encoder, then both sinks, so everything
    /// already accepted into a queue is drained. Shutdown is then forced before the stats
    /// reporter and timer are joined.
    pub fn run(self) -> Result<PipelineReport, Error> {
        let Self { collaborators, queues, shared, stats_interval, duration } = self;
        let started = Instant::now();
        let abort = |err: Error| {
            shared.shutdown.request();
            err
        };

        let video_capture = {
            let (shared, output) = (shared.clone(), queues.raw_video.clone());
            let open = collaborators.video_source;
            spawn_role(Role::VideoCapture, shared.shutdown.clone(), move || video_capture(open, &output, &shared))
        }
        .map_err(abort)?;
        let audio_capture = {
            let (shared, output) = (shared.clone(), queues.audio.clone());
            let open = collaborators.audio_source;
            spawn_role(Role::AudioCapture, shared.shutdown.clone(), move || audio_capture(open, &output, &shared))
        }
        .map_err(abort)?;
        let video_encode = {
            let (shared, input, output) =
                (shared.clone(), queues.raw_video.clone(), queues.encoded_video.clone());
            let open = collaborators.encoder;
            spawn_role(Role::VideoEncode, shared.shutdown.clone(), move || video_encode(open, &input, &output, &shared))
        }
        .map_err(abort)?;
        let video_sink = {
            let (shared, input) = (shared.clone(), queues.encoded_video.clone());
            let open = collaborators.video_sink;
            spawn_role(Role::VideoSink, shared.shutdown.clone(), move || {
                run_sink(Role::VideoSink, open, &input, &shared, |packet: &EncodedPacket| {
                    (packet.data.as_slice(), packet.pts_us, packet.is_keyframe)
                })
            })
        }
        .map_err(abort)?;
        let audio_sink = {
            let (shared, input) = (shared.clone(), queues.audio.clone());
            let open = collaborators.audio_sink;
            spawn_role(Role::AudioSink, shared.shutdown.clone(), move || {
                run_sink(Role::AudioSink, open, &input, &shared, |chunk: &AudioChunk| {
                    (chunk.data.as_slice(), chunk.pts_us, false)
                })
            })
        }
        .map_err(abort)?;

        let queues = Arc::new(queues);
        let reporter = {
            let (shared, queues) = (shared.clone(), queues.clone());
            spawn_role(Role::Stats, shared.shutdown.clone(), move || report_stats(&shared, &queues, stats_interval))
        }
        .map_err(abort)?;
        let timer = match duration {
            Some(duration) => Some(shutdown::spawn_timer(&shared.shutdown, duration).map_err(|e| abort(e.into()))?),
            None => None,
        };

        let mut panicked = None;
        join_role::<()>(video_capture, Role::VideoCapture, &mut panicked);
        join_role::<()>(audio_capture, Role::AudioCapture, &mut panicked);
        join_role::<()>(video_encode, Role::VideoEncode, &mut panicked);
        let video = join_role(video_sink, Role::VideoSink, &mut panicked);
        let audio = join_role(audio_sink, Role::AudioSink, &mut panicked);

        let drained = shared.shutdown.request();
        let mut totals: StatsTotals = join_role(reporter, Role::Stats, &mut panicked);
        if let Some(timer) = timer
            && timer.join().is_err()
        {
            warn!("[timer] thread panicked");
        }
        totals.accumulate(&shared.stats.take_window());

        if let Some(role) = panicked {
            return Err(Error::RolePanicked(role));
        }

        let stop_reason = match *shared.failure.lock() {
            Some(role) => StopReason::Failed(role),
            None if drained => StopReason::Drained,
            None => StopReason::Requested,
        };
        let report = PipelineReport { totals, video, audio, stop_reason, elapsed: started.elapsed() };
        info!(
            "pipeline stopped ({stop_reason}) after {:.2}s: video_frames={} audio_chunks={} drops={} h264_bytes={} pcm_bytes={}",
            report.elapsed.as_secs_f64(),
            totals.video_frames,
            totals.audio_chunks,
            totals.drops,
            video.bytes,
            audio.bytes
        );

        Ok(report)
    }
}

/// Joins a role thread, recording the first one that panicked.
fn join_role<T: Default>(handle: JoinHandle<T>, role: Role, panicked: &mut Option<Role>) -> T {
    handle.join().unwrap_or_else(|_| {
        error!("[{role}] thread panicked");
        panicked.get_or_insert(role);
        T::default()
    })
}

fn spawn_role<T, F>(role: Role, shutdown: Shutdown, body: F) -> Result<JoinHandle<T>, Error>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(role.name().to_string())
        .spawn(move || {
            let _stop = StopOnPanic { role, shutdown };
            debug!("[{role}] started");
            let out = body();
            debug!("[{role}] stopped");
            out
        })
        .map_err(|source| Error::Spawn { role, source })
}

fn video_capture(
    open: Open<Box<dyn VideoSource>, CaptureError>,
    output: &Arc<BoundedQueue<VideoFrame>>,
    shared: &Shared,
) {
    let _close = CloseOnExit(output.clone());
    let mut source = match open() {
        Ok(source) => source,
        Err(e) => return shared.fail(Role::VideoCapture, &e),
    };

    let format = source.format();
    let mut gaps = SequenceTracker::new();
    let mut frame_id = 0;

    while !shared.shutdown.is_requested() {
        let (data, seq) = match source.dequeue() {
            Ok(Dequeued::Frame { data, sequence }) => (data, sequence),
            Ok(Dequeued::NoData) => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Ok(Dequeued::End) => {
                debug!("[{}] end of stream", Role::VideoCapture);
                break;
            }
            Err(e) => {
                debug!("[{}] dequeue failed: {e}", Role::VideoCapture);
                shared.stats.add_drops(1);
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };
        let pts_us = shared.clock.now_us();

        let skipped = gaps.observe(seq);
        if skipped > 0 {
            debug!("[{}] sequence gap, {skipped} frame(s) lost", Role::VideoCapture);
            shared.stats.add_drops(skipped);
        }

        let Some(data) = frame::try_copy(data) else {
            shared.stats.add_drops(1);
            continue;
        };
        let frame = VideoFrame {
            data,
            width: format.width,
            height: format.height,
            stride: format.stride,
            pts_us,
            frame_id,
        };
        frame_id += 1;

        match output.try_push(frame) {
            Ok(()) => {}
            Err(TryPushError::Full(_)) => shared.stats.add_drops(1),
            Err(TryPushError::Closed(_)) => break,
        }
    }
}

fn video_encode(
    open: Open<Box<dyn VideoEncoder>, EncodeError>,
    input: &BoundedQueue<VideoFrame>,
    output: &Arc<BoundedQueue<EncodedPacket>>,
    shared: &Shared,
) {
    let _close = CloseOnExit(output.clone());
    let mut encoder = match open() {
        Ok(encoder) => encoder,
        Err(e) => return shared.fail(Role::VideoEncode, &e),
    };

    while let Some(frame) = input.pop() {
        let chunk = match encoder.encode(&frame) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => continue,
            Err(e) => {
                debug!("[{}] frame {} dropped: {e}", Role::VideoEncode, frame.frame_id);
                shared.stats.add_drops(1);
                continue;
            }
        };

        let bytes = chunk.data.len() as u64;
        let packet = EncodedPacket { data: chunk.data, pts_us: frame.pts_us, is_keyframe: chunk.is_keyframe };
        if output.push(packet).is_err() {
            break;
        }
        shared.stats.inc_video_frame();
        shared.stats.add_encoded_bytes(bytes);
    }
}

fn audio_capture(
    open: Open<Box<dyn AudioSource>, CaptureError>,
    output: &Arc<BoundedQueue<AudioChunk>>,
    shared: &Shared,
) {
    let _close = CloseOnExit(output.clone());
    let mut source = match open() {
        Ok(source) => source,
        Err(e) => return shared.fail(Role::AudioCapture, &e),
    };

    let format = source.format();
    if format.sample_rate == 0 || format.period_bytes() == 0 {
        let err = CaptureError::Read(format!("unusable audio format {format:?}"));
        return shared.fail(Role::AudioCapture, &err);
    }
    let mut pts = AudioPtsClock::starting_now(&*shared.clock, format.sample_rate);

    while !shared.shutdown.is_requested() {
        let Some(mut data) = frame::try_alloc(format.period_bytes()) else {
            shared.stats.add_drops(1);
            thread::sleep(POLL_INTERVAL);
            continue;
        };

        let frames = match source.read(&mut data) {
            Ok(AudioRead::Frames(0)) => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Ok(AudioRead::Frames(frames)) => frames.min(format.frames_per_period),
            Ok(AudioRead::End) => {
                debug!("[{}] end of stream", Role::AudioCapture);
                break;
            }
            Err(e) => {
                debug!("[{}] read failed: {e}", Role::AudioCapture);
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };
        data.truncate(frames as usize * format.bytes_per_frame());

        let chunk = AudioChunk {
            data,
            sample_rate: format.sample_rate,
            channels: format.channels,
            bytes_per_sample: format.bytes_per_sample,
            frames,
            pts_us: pts.stamp(frames),
        };
        if output.push(chunk).is_err() {
            break;
        }
    }
}

/// Shared body of both sinks. `view` exposes an item's bytes, PTS and keyframe flag.
fn run_sink<T>(
    role: Role,
    open: Open<Box<dyn Sink>, SinkError>,
    input: &BoundedQueue<T>,
    shared: &Shared,
    view: impl Fn(&T) -> (&[u8], u64, bool),
) -> SinkSummary {
    let mut summary = SinkSummary::default();
    let mut sink = match open() {
        Ok(sink) => sink,
        Err(e) => {
            shared.fail(role, &e);
            return summary;
        }
    };
    let mut deltas = PtsDeltaTracker::default();

    while let Some(item) = input.pop() {
        let (data, pts_us, is_keyframe) = view(&item);
        if let Err(e) = sink.write(data) {
            warn!("[{role}] write failed: {e}, stopping");
            shared.stop_for(role);
            break;
        }

        if let Some(delta) = deltas.observe(pts_us) {
            match role {
                Role::AudioSink => shared.deltas.set_audio(delta),
                _ => shared.deltas.set_video(delta),
            }
        }
        if role == Role::AudioSink {
            shared.stats.inc_audio_chunk();
        }
        summary.record(data.len(), pts_us, is_keyframe);
    }

    if let Err(e) = sink.flush() {
        warn!("[{role}] flush failed: {e}");
    }

    summary
}

fn report_stats(shared: &Shared, queues: &PipelineQueues, interval: Duration) -> StatsTotals {
    let interval = interval.max(POLL_INTERVAL);
    let mut totals = StatsTotals::default();
    let mut window_start = Instant::now();
    while !shared.shutdown.wait_timeout(interval) {
        let window = shared.stats.take_window();
        let now = Instant::now();
        totals.accumulate(&window);
        info!("{}", shared.status_line(window, now - window_start, queues));
        window_start = now;
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_average_delta() {
        let mut summary = SinkSummary::default();
        assert_eq!(summary.average_pts_delta_us(), None);
        for pts in [1_000, 34_333, 67_666] {
            summary.record(10, pts, false);
        }
        assert_eq!(summary.items, 3);
        assert_eq!(summary.bytes, 30);
        assert_eq!(summary.average_pts_delta_us(), Some(33_333.0));
    }

    #[test]
    fn missing_collaborator_is_reported() {
        let err = Pipeline::builder().build().err();
        assert!(matches!(err, Some(Error::MissingCollaborator(Role::VideoCapture))));
    }

    #[test]
    fn close_on_exit_closes_queue() {
        let queue = Arc::new(BoundedQueue::<u8>::new(1));
        drop(CloseOnExit(queue.clone()));
        assert!(queue.is_closed());
    }

    #[test]
    fn role_names() {
        assert_eq!(Role::VideoCapture.to_string(), "video-capture");
        assert_eq!(StopReason::Failed(Role::AudioSink).to_string(), "audio-sink failed");
    }
}

use std::process::ExitCode;

use av_recorder::config::AppConfig;
use av_recorder::pipeline::{self, Pipeline, StopReason};
use av_recorder::shutdown;
use av_recorder::synthetic::{AnnexBEncoder, TestPatternSource, ToneSource};
use clap::Parser;
use log::{error, info};

fn run(config: AppConfig) -> Result<StopReason, pipeline::Error> {
    let config = config.validate()?;
    info!("{}", config.summary());

    let settings = config.video_settings()?;
    let (video_dev, video_format, fps) = (config.video_dev.clone(), config.video_format(), config.fps);
    let (audio_dev, audio_format) = (config.audio_dev.clone(), config.audio_format());
    let (sink, out_h264, out_pcm) = (config.sink, config.out_h264.clone(), config.out_pcm.clone());

    let pipeline = Pipeline::builder()
        .video_source(move || TestPatternSource::open(&video_dev, video_format, fps))
        .encoder(move || Ok(AnnexBEncoder::new(settings)))
        .audio_source(move || ToneSource::open(&audio_dev, audio_format))
        .video_sink(move || sink.open(out_h264))
        .audio_sink(move || sink.open(out_pcm))
        .duration(config.duration())
        .build()?;

    shutdown::listen_for_ctrl_c(&pipeline.shutdown())?;

    let report = pipeline.run()?;
    info!(
        "wrote {} packets ({} keyframes, {} bytes) and {} audio chunks ({} bytes), {} drops",
        report.video.items,
        report.video.keyframes,
        report.video.bytes,
        report.audio.items,
        report.audio.bytes,
        report.totals.drops
    );

    Ok(report.stop_reason)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(AppConfig::parse()) {
        Ok(StopReason::Failed(role)) => {
            error!("stopped because {role} failed");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

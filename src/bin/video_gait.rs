//! 動画ファイルから歩行周期を解析して JSON を出力する
//!
//! Usage: video_gait <video> [--side left|right] [--verbose]

use anyhow::{bail, Context, Result};
use gait_phase::capture::{CaptureSession, VideoFileSource};
use gait_phase::config::Config;
use gait_phase::gait::GaitAnalyzer;
use gait_phase::pose::{OnnxPoseEstimator, PoseEstimator, Side};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

fn parse_args(config: &mut Config) -> Result<(PathBuf, bool)> {
    let mut video = None;
    let mut verbose = false;
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => verbose = true,
            "--side" => {
                config.capture.side = match iter.next().as_deref() {
                    Some("left") => Side::Left,
                    Some("right") => Side::Right,
                    other => bail!("--side must be left or right, got {:?}", other),
                };
            }
            other if other.starts_with('-') => bail!("unknown option: {}", other),
            path => video = Some(PathBuf::from(path)),
        }
    }
    let video = video.context("usage: video_gait <video> [--side left|right] [--verbose]")?;
    Ok((video, verbose))
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::load_or_default(CONFIG_PATH);
    let (video, verbose) = parse_args(&mut config)?;

    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    info!("video_gait ({})", env!("GAIT_PHASE_VERSION"));

    let analyzer = GaitAnalyzer::from_config(&config)?;
    let source = VideoFileSource::open(&video)?;

    let mut estimator = OnnxPoseEstimator::new(&config.capture.model_path, config.capture.model);
    estimator.initialize()?;

    let session = CaptureSession::new(source, &mut estimator, &config.capture)?;

    // Ctrl+C で次のフレームの前に取得を打ち切り、それまでのサンプルで解析する
    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing with captured frames");
            cancel.cancel();
        }
    });

    let captured = session.collect().await;
    estimator.dispose();
    let samples = captured?;

    let report = analyzer.analyze(&samples, config.capture.fps);
    if !report.has_cycles() {
        warn!(samples = samples.len(), "no complete gait cycle found");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

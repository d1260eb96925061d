use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::path::Path;
use tracing::info;

use super::FrameSource;

/// OpenCVで動画ファイルを開き、時刻指定でフレームを読む
pub struct VideoFileSource {
    capture: VideoCapture,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: f64,
}

impl VideoFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_str().context("video path is not valid UTF-8")?;
        let capture = VideoCapture::from_file(name, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("Failed to open video: {}", path.display()))?;

        if !capture.is_opened()? {
            bail!("Video {} could not be opened", path.display());
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
        info!(path = %path.display(), width, height, fps, frame_count, "video opened");

        Ok(Self {
            capture,
            width,
            height,
            fps,
            frame_count,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// コンテナに記録されたフレームレート
    pub fn native_fps(&self) -> f64 {
        self.fps
    }
}

impl FrameSource for VideoFileSource {
    type Frame = Mat;

    fn duration_secs(&self) -> f32 {
        if self.fps > 0.0 && self.frame_count > 0.0 {
            (self.frame_count / self.fps) as f32
        } else {
            0.0
        }
    }

    /// BGR形式のフレーム。末尾を越えた・空のフレームは `None`
    fn frame_at(&mut self, t: f32) -> Result<Option<Mat>> {
        self.capture
            .set(videoio::CAP_PROP_POS_MSEC, t as f64 * 1000.0)
            .context("Failed to seek video")?;

        let mut frame = Mat::default();
        let ok = self.capture.read(&mut frame).context("Failed to read frame")?;
        if !ok || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

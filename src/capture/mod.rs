//! フレーム取得: 動画から1フレームずつ取り出し、姿勢推定して FrameSample にする。
//!
//! 取得は利用側が `next_sample` を呼んだときにだけ進む (プル型)。キャンセルと
//! 最大フレーム数はセッションが明示的に持つ。

pub mod session;
#[cfg(feature = "desktop")]
pub mod video;

use anyhow::Result;

pub use session::CaptureSession;
#[cfg(feature = "desktop")]
pub use video::VideoFileSource;

/// 時刻指定でフレームを取り出せる映像ソース
pub trait FrameSource {
    type Frame;

    /// 映像の長さ（秒）
    fn duration_secs(&self) -> f32;

    /// `t` 秒のフレーム。デコードできなければ `Ok(None)`
    fn frame_at(&mut self, t: f32) -> Result<Option<Self::Frame>>;
}

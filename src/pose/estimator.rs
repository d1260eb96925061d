use anyhow::Result;

use super::keypoint::Pose;

/// 姿勢推定サービス
///
/// 呼び出し側が所有し、`initialize` → `estimate`* → `dispose` の順で使う。
pub trait PoseEstimator<F> {
    /// モデルを読み込む。読み込み済みなら何もしない
    fn initialize(&mut self) -> Result<()>;

    /// 1フレーム分の推論。人物が検出できなければ `Ok(None)`
    fn estimate(&mut self, frame: &F) -> Result<Option<Pose>>;

    /// モデルを解放する。再度 `initialize` すれば再利用できる
    fn dispose(&mut self);

    fn is_ready(&self) -> bool;
}

impl<F, E: PoseEstimator<F> + ?Sized> PoseEstimator<F> for Box<E> {
    fn initialize(&mut self) -> Result<()> {
        (**self).initialize()
    }

    fn estimate(&mut self, frame: &F) -> Result<Option<Pose>> {
        (**self).estimate(frame)
    }

    fn dispose(&mut self) {
        (**self).dispose()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

use anyhow::{bail, Result};
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::FrameSource;
use crate::config::CaptureConfig;
use crate::gait::FrameSample;
use crate::pose::{PoseEstimator, Side};

/// 1本の映像からの FrameSample 取得
///
/// 推定器は呼び出し側が所有し、初期化済みのものを借りる。
/// キャンセルはフレーム間でだけ確認するので、推論の途中で打ち切られることはない。
pub struct CaptureSession<'a, S: FrameSource, E> {
    source: S,
    estimator: &'a mut E,
    fps: f32,
    side: Side,
    confidence_threshold: f32,
    cancel: CancellationToken,
    /// 試行するタイムスタンプ数
    limit: usize,
    next_index: usize,
    skipped: usize,
}

impl<'a, S, E> CaptureSession<'a, S, E>
where
    S: FrameSource,
    E: PoseEstimator<S::Frame>,
{
    pub fn new(source: S, estimator: &'a mut E, config: &CaptureConfig) -> Result<Self> {
        if !(config.fps > 0.0 && config.fps.is_finite()) {
            bail!("invalid capture fps: {}", config.fps);
        }
        if !estimator.is_ready() {
            bail!("pose estimator must be initialized before capture");
        }

        let duration = source.duration_secs().min(config.max_duration_secs).max(0.0);
        let limit = (duration * config.fps).floor() as usize;
        debug!(duration, fps = config.fps, limit, "capture session created");

        Ok(Self {
            source,
            estimator,
            fps: config.fps,
            side: config.side,
            confidence_threshold: config.confidence_threshold,
            cancel: CancellationToken::new(),
            limit,
            next_index: 0,
            skipped: 0,
        })
    }

    /// 外部から共有するキャンセルトークンを使う
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// キャンセル用トークン (clone して他タスクから `cancel()` する)
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn frames_attempted(&self) -> usize {
        self.next_index
    }

    pub fn frames_skipped(&self) -> usize {
        self.skipped
    }

    pub fn frame_limit(&self) -> usize {
        self.limit
    }

    /// 次の FrameSample を取得する
    ///
    /// 取得できないフレーム (デコード失敗・人物なし・低信頼度) は飛ばして次の時刻を試す。
    /// キャンセル済み、または最大フレーム数に達したら `None`。
    pub async fn next_sample(&mut self) -> Option<Result<FrameSample>> {
        loop {
            if self.cancel.is_cancelled() {
                debug!(attempted = self.next_index, "capture cancelled");
                return None;
            }
            if self.next_index >= self.limit {
                return None;
            }

            let t = self.next_index as f32 / self.fps;
            self.next_index += 1;
            let outcome = self.capture_at(t);

            // 1フレームごとにランタイムへ制御を返す
            tokio::task::yield_now().await;

            match outcome {
                Ok(Some(sample)) => return Some(Ok(sample)),
                Ok(None) => self.skipped += 1,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn capture_at(&mut self, t: f32) -> Result<Option<FrameSample>> {
        let frame = match self.source.frame_at(t) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(t, "no frame at timestamp");
                return Ok(None);
            }
            Err(e) => {
                warn!(t, "frame seek failed: {:#}", e);
                return Ok(None);
            }
        };

        let Some(pose) = self.estimator.estimate(&frame)? else {
            debug!(t, "no landmarks");
            return Ok(None);
        };

        let sample = FrameSample::from_pose(t, &pose, self.side, self.confidence_threshold);
        if sample.is_none() {
            debug!(t, "leg landmarks below confidence threshold");
        }
        Ok(sample)
    }

    /// `futures::Stream` として取り出す
    pub fn into_stream(self) -> impl Stream<Item = Result<FrameSample>> + 'a
    where
        S: 'a,
    {
        futures::stream::unfold(self, |mut session| async move {
            let item = session.next_sample().await?;
            Some((item, session))
        })
    }

    /// 最後まで (またはキャンセルまで) 取得する。推定器のエラーで中断
    pub async fn collect(mut self) -> Result<Vec<FrameSample>> {
        let mut samples = Vec::new();
        while let Some(sample) = self.next_sample().await {
            samples.push(sample?);
        }
        info!(
            samples = samples.len(),
            attempted = self.next_index,
            skipped = self.skipped,
            cancelled = self.cancel.is_cancelled(),
            "capture finished"
        );
        Ok(samples)
    }
}

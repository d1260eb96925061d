use anyhow::{bail, Context, Result};
use ndarray::ArrayViewD;
use opencv::core::Mat;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::estimator::PoseEstimator;
use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::model::PoseModel;
use super::preprocess::{preprocess_for_movenet, preprocess_for_spinepose, Letterbox};

/// ONNX 姿勢推定モデル (MoveNet / SpinePose)
///
/// `initialize` まではセッションを持たない。
pub struct OnnxPoseEstimator {
    model_path: PathBuf,
    model: PoseModel,
    session: Option<Session>,
    /// この平均信頼度未満のフレームは「人物なし」とみなす
    min_average_confidence: f32,
}

impl OnnxPoseEstimator {
    pub fn new<P: AsRef<Path>>(model_path: P, model: PoseModel) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model,
            session: None,
            min_average_confidence: 0.05,
        }
    }

    pub fn with_min_average_confidence(mut self, threshold: f32) -> Self {
        self.min_average_confidence = threshold;
        self
    }

    pub fn model(&self) -> PoseModel {
        self.model
    }

    fn session(&mut self) -> Result<&mut Session> {
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => bail!("pose model is not initialized"),
        }
    }

    /// 出力: [1, 1, N, 3] (y, x, confidence)
    fn detect_movenet(&mut self, frame: &Mat) -> Result<Pose> {
        let input = Tensor::from_array(preprocess_for_movenet(frame)?)?;
        let outputs = self
            .session()?
            .run(ort::inputs!["serving_default_input_0" => input])
            .context("Inference failed")?;

        let output: ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;
        if output.ndim() != 4 || output.shape()[3] < 3 {
            bail!("unexpected MoveNet output shape: {:?}", output.shape());
        }

        let emitted = output.shape()[2].min(KeypointIndex::COUNT);
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for (i, kp) in keypoints.iter_mut().enumerate().take(emitted) {
            let y = output[[0, 0, i, 0]];
            let x = output[[0, 0, i, 1]];
            let confidence = output[[0, 0, i, 2]];
            *kp = Keypoint::new(x, y, confidence);
        }

        Ok(Pose::with_emitted(keypoints, emitted))
    }

    fn detect_spinepose(&mut self, frame: &Mat) -> Result<Pose> {
        let (tensor, letterbox) = preprocess_for_spinepose(frame)?;
        let input = Tensor::from_array(tensor)?;
        let outputs = self
            .session()?
            .run(ort::inputs!["input" => input])
            .context("Inference failed")?;

        let simcc_x: ArrayViewD<f32> = outputs["simcc_x"]
            .try_extract_array()
            .context("Failed to extract simcc_x")?;
        let simcc_y: ArrayViewD<f32> = outputs["simcc_y"]
            .try_extract_array()
            .context("Failed to extract simcc_y")?;

        decode_simcc(&simcc_x, &simcc_y, &letterbox)
    }
}

/// SimCC 出力 ([1, K, W*2], [1, K, H*2]) の argmax を元フレームの正規化座標に戻す
///
/// 信頼度は x/y の最大ロジットの平均にシグモイドをかけたもの。
fn decode_simcc(simcc_x: &ArrayViewD<f32>, simcc_y: &ArrayViewD<f32>, letterbox: &Letterbox) -> Result<Pose> {
    if simcc_x.ndim() != 3 || simcc_y.ndim() != 3 || simcc_x.shape()[1] != simcc_y.shape()[1] {
        bail!(
            "unexpected SimCC output shapes: {:?} / {:?}",
            simcc_x.shape(),
            simcc_y.shape()
        );
    }
    let (x_bins, y_bins) = (simcc_x.shape()[2], simcc_y.shape()[2]);
    if x_bins == 0 || y_bins == 0 {
        bail!("empty SimCC output");
    }

    let emitted = simcc_x.shape()[1].min(KeypointIndex::COUNT);
    let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
    for (i, kp) in keypoints.iter_mut().enumerate().take(emitted) {
        let (x_idx, x_logit) = argmax((0..x_bins).map(|j| simcc_x[[0, i, j]]));
        let (y_idx, y_logit) = argmax((0..y_bins).map(|j| simcc_y[[0, i, j]]));

        let (x, y) = letterbox.to_frame(x_idx as f32 / x_bins as f32, y_idx as f32 / y_bins as f32);
        let avg_logit = (x_logit + y_logit) / 2.0;
        let confidence = 1.0 / (1.0 + (-avg_logit).exp());
        *kp = Keypoint::new(x, y, confidence);
    }

    Ok(Pose::with_emitted(keypoints, emitted))
}

fn argmax(values: impl Iterator<Item = f32>) -> (usize, f32) {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
}

impl PoseEstimator<Mat> for OnnxPoseEstimator {
    fn initialize(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&self.model_path)
            .with_context(|| format!("Failed to load ONNX model: {}", self.model_path.display()))?;
        info!(model = ?self.model, path = %self.model_path.display(), "pose model loaded");
        if !self.model.has_foot_keypoints() {
            warn!(model = ?self.model, "model has no foot keypoints, ankle angles will be undefined");
        }
        self.session = Some(session);
        Ok(())
    }

    fn estimate(&mut self, frame: &Mat) -> Result<Option<Pose>> {
        let pose = match self.model {
            PoseModel::MoveNet => self.detect_movenet(frame)?,
            PoseModel::SpinePose => self.detect_spinepose(frame)?,
        };
        let avg = pose.average_confidence();
        if avg < self.min_average_confidence {
            debug!(avg, "no person in frame");
            return Ok(None);
        }
        Ok(Some(pose))
    }

    fn dispose(&mut self) {
        if self.session.take().is_some() {
            info!("pose model released");
        }
    }

    fn is_ready(&self) -> bool {
        self.session.is_some()
    }
}

use serde::{Deserialize, Serialize};

use super::keypoint::KeypointIndex;

/// 姿勢推定モデルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseModel {
    /// MoveNet (COCO 17点)。足のキーポイントがないので足首角は未定義になる
    MoveNet,
    /// SpinePose (SimCC)。先頭23点が COCO-WholeBody の体+足と同じ並び
    #[default]
    SpinePose,
}

impl PoseModel {
    /// このクレートで使うキーポイントのうち、モデルが出力する数
    pub fn keypoint_count(self) -> usize {
        match self {
            PoseModel::MoveNet => 17,
            PoseModel::SpinePose => KeypointIndex::COUNT,
        }
    }

    pub fn has_foot_keypoints(self) -> bool {
        self.keypoint_count() > KeypointIndex::LeftBigToe as usize
    }
}

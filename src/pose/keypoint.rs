use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// COCO 17 キーポイント + COCO-WholeBody の足 6 点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
    LeftBigToe = 17,
    LeftSmallToe = 18,
    LeftHeel = 19,
    RightBigToe = 20,
    RightSmallToe = 21,
    RightHeel = 22,
}

impl KeypointIndex {
    pub const COUNT: usize = 23;

    pub fn from_index(index: usize) -> Option<Self> {
        use KeypointIndex::*;
        const ALL: [KeypointIndex; KeypointIndex::COUNT] = [
            Nose, LeftEye, RightEye, LeftEar, RightEar,
            LeftShoulder, RightShoulder, LeftElbow, RightElbow, LeftWrist, RightWrist,
            LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle,
            LeftBigToe, LeftSmallToe, LeftHeel, RightBigToe, RightSmallToe, RightHeel,
        ];
        ALL.get(index).copied()
    }
}

/// 解析対象の脚
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Left,
    Right,
}

/// 片脚の角度計算に使うキーポイント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegKeypoints {
    pub shoulder: KeypointIndex,
    pub hip: KeypointIndex,
    pub knee: KeypointIndex,
    pub ankle: KeypointIndex,
    pub toe: KeypointIndex,
}

impl Side {
    pub fn leg(self) -> LegKeypoints {
        use KeypointIndex::*;
        match self {
            Side::Left => LegKeypoints {
                shoulder: LeftShoulder,
                hip: LeftHip,
                knee: LeftKnee,
                ankle: LeftAnkle,
                toe: LeftBigToe,
            },
            Side::Right => LegKeypoints {
                shoulder: RightShoulder,
                hip: RightHip,
                knee: RightKnee,
                ankle: RightAnkle,
                toe: RightBigToe,
            },
        }
    }
}

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0、下向きが正)
    pub y: f32,
    /// 奥行き (2Dモデルでは 0.0)
    pub z: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, z: 0.0, confidence }
    }

    pub fn new_3d(x: f32, y: f32, z: f32, confidence: f32) -> Self {
        Self { x, y, z, confidence }
    }

    /// 信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// 角度計算用の座標ベクトル
    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            confidence: 0.0,
        }
    }
}

/// 23キーポイントからなる姿勢
#[derive(Debug, Clone)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
    /// モデルが実際に出力したキーポイント数 (先頭から)。残りは信頼度0
    emitted: usize,
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self::with_emitted(keypoints, KeypointIndex::COUNT)
    }

    /// 先頭 `emitted` 個だけをモデルが出力した姿勢 (例: MoveNet は 17)
    pub fn with_emitted(keypoints: [Keypoint; KeypointIndex::COUNT], emitted: usize) -> Self {
        Self {
            keypoints,
            emitted: emitted.min(KeypointIndex::COUNT),
        }
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// モデルが出力したキーポイントの平均信頼度
    pub fn average_confidence(&self) -> f32 {
        if self.emitted == 0 {
            return 0.0;
        }
        let sum: f32 = self.keypoints[..self.emitted].iter().map(|k| k.confidence).sum();
        sum / self.emitted as f32
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new([Keypoint::default(); KeypointIndex::COUNT])
    }
}

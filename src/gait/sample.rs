use serde::{Deserialize, Serialize};

use super::angle::angle_deg;
use crate::pose::{Pose, Side};

/// 関節
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joint {
    Hip,
    Knee,
    Ankle,
}

impl Joint {
    pub const ALL: [Joint; 3] = [Joint::Hip, Joint::Knee, Joint::Ankle];
}

/// 解析できた1フレーム分の計測値
///
/// ランドマーク検出に失敗したフレームは記録されないため `t` の間隔は一定とは限らない。
/// 角度が定義できない場合は NaN が入る (JSON では `null`)。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSample {
    /// 動画先頭からの秒数
    pub t: f32,
    #[serde(with = "nan_as_null")]
    pub hip: f32,
    #[serde(with = "nan_as_null")]
    pub knee: f32,
    #[serde(with = "nan_as_null")]
    pub ankle: f32,
    pub side: Side,
    /// 足首の正規化Y座標 (下向きが正)。周期検出にのみ使う
    #[serde(with = "nan_as_null")]
    pub y_ankle: f32,
}

impl FrameSample {
    /// 姿勢から1フレーム分の計測値を作る
    ///
    /// - 股関節: 肩-股-膝
    /// - 膝: 股-膝-足首
    /// - 足首: 膝-足首-母趾
    ///
    /// 肩・股・膝・足首のどれかが閾値未満ならフレームごと捨てる (`None`)。
    /// 母趾だけが欠けている場合は足首角を NaN にして残す。
    pub fn from_pose(t: f32, pose: &Pose, side: Side, confidence_threshold: f32) -> Option<Self> {
        let leg = side.leg();
        let shoulder = pose.get(leg.shoulder);
        let hip = pose.get(leg.hip);
        let knee = pose.get(leg.knee);
        let ankle = pose.get(leg.ankle);
        let toe = pose.get(leg.toe);

        let required = [shoulder, hip, knee, ankle];
        if required.iter().any(|kp| !kp.is_valid(confidence_threshold)) {
            return None;
        }

        let hip_angle = angle_deg(shoulder.position(), hip.position(), knee.position());
        let knee_angle = angle_deg(hip.position(), knee.position(), ankle.position());
        let ankle_angle = if toe.is_valid(confidence_threshold) {
            angle_deg(knee.position(), ankle.position(), toe.position())
        } else {
            f32::NAN
        };

        Some(Self {
            t,
            hip: hip_angle,
            knee: knee_angle,
            ankle: ankle_angle,
            side,
            y_ankle: ankle.y,
        })
    }

    pub fn angle(&self, joint: Joint) -> f32 {
        match joint {
            Joint::Hip => self.hip,
            Joint::Knee => self.knee,
            Joint::Ankle => self.ankle,
        }
    }
}

/// NaN <-> null
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f32(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::NAN))
    }
}

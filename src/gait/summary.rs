use serde::{Deserialize, Serialize};

use super::phase::{GaitCycle, Phase, PhaseSegment};
use super::sample::{FrameSample, Joint};

/// 1相分の関節角度の代表値 (中央値)。サンプルがなければ `None`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseStat {
    pub phase: Phase,
    pub hip: Option<f32>,
    pub knee: Option<f32>,
    pub ankle: Option<f32>,
}

impl PhaseStat {
    pub fn get(&self, joint: Joint) -> Option<f32> {
        match joint {
            Joint::Hip => self.hip,
            Joint::Knee => self.knee,
            Joint::Ankle => self.ankle,
        }
    }
}

/// 中央値。NaN は除外する
///
/// 偶数個のときは下側の中央値 (ソート後の `(n - 1) / 2` 番目) を返す。
/// 2値の平均は取らないので、常に実測値のどれかが返る。
pub fn median(values: &[f32]) -> Option<f32> {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f32::total_cmp);
    Some(sorted[(sorted.len() - 1) / 2])
}

/// 1相・1関節の中央値
pub fn joint_median(frames: &[FrameSample], segment: &PhaseSegment, joint: Joint) -> Option<f32> {
    let end = segment.end_idx.min(frames.len());
    let start = segment.start_idx.min(end);
    let values: Vec<f32> = frames[start..end].iter().map(|f| f.angle(joint)).collect();
    median(&values)
}

pub fn summarize_segment(frames: &[FrameSample], segment: &PhaseSegment) -> PhaseStat {
    PhaseStat {
        phase: segment.name,
        hip: joint_median(frames, segment, Joint::Hip),
        knee: joint_median(frames, segment, Joint::Knee),
        ankle: joint_median(frames, segment, Joint::Ankle),
    }
}

/// 周期内の全相を集計
pub fn summarize_cycle(frames: &[FrameSample], cycle: &GaitCycle) -> Vec<PhaseStat> {
    cycle
        .phases
        .iter()
        .map(|segment| summarize_segment(frames, segment))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Side;

    fn frame(hip: f32, knee: f32, ankle: f32) -> FrameSample {
        FrameSample {
            t: 0.0,
            hip,
            knee,
            ankle,
            side: Side::Left,
            y_ankle: 0.5,
        }
    }

    #[test]
    fn test_median_odd() {
        assert_eq!(median(&[10.0, 20.0, 30.0]), Some(20.0));
        assert_eq!(median(&[30.0, 10.0, 20.0]), Some(20.0));
        assert_eq!(median(&[42.0]), Some(42.0));
    }

    #[test]
    fn test_median_even_lower_middle() {
        assert_eq!(median(&[10.0, 20.0]), Some(10.0));
        assert_eq!(median(&[20.0, 10.0]), Some(10.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.0));
    }

    #[test]
    fn test_median_ignores_nan() {
        assert_eq!(median(&[f32::NAN, 10.0, 30.0, f32::NAN, 20.0]), Some(20.0));
        assert_eq!(median(&[f32::NAN, f32::NAN]), None);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_median_robust_to_outlier() {
        assert_eq!(median(&[150.0, 151.0, 152.0, 10.0, 153.0]), Some(151.0));
    }

    #[test]
    fn test_summarize_segment() {
        let frames = vec![
            frame(170.0, 160.0, 90.0),
            frame(160.0, 150.0, f32::NAN),
            frame(150.0, 140.0, f32::NAN),
            frame(140.0, 130.0, 100.0),
        ];
        let seg = PhaseSegment { name: Phase::Ms, start_idx: 1, end_idx: 3 };
        let stat = summarize_segment(&frames, &seg);
        assert_eq!(stat.phase, Phase::Ms);
        assert_eq!(stat.hip, Some(150.0));
        assert_eq!(stat.knee, Some(140.0));
        // 区間内の足首角は全て未定義
        assert_eq!(stat.ankle, None);
        assert_eq!(stat.get(Joint::Knee), Some(140.0));
    }

    #[test]
    fn test_empty_segment_is_none() {
        let frames = vec![frame(170.0, 160.0, 90.0)];
        let seg = PhaseSegment { name: Phase::Ic, start_idx: 1, end_idx: 1 };
        let stat = summarize_segment(&frames, &seg);
        assert_eq!(stat.hip, None);
        assert_eq!(stat.knee, None);
        assert_eq!(stat.ankle, None);

        // 範囲外でもパニックしない
        let seg = PhaseSegment { name: Phase::TSw, start_idx: 5, end_idx: 9 };
        assert_eq!(summarize_segment(&frames, &seg).hip, None);
    }

    #[test]
    fn test_summarize_cycle_order() {
        let frames: Vec<FrameSample> = (0..8).map(|i| frame(i as f32, 0.0, 0.0)).collect();
        let cycle = GaitCycle {
            cycle_start: 0,
            cycle_end: 8,
            phases: Phase::ALL
                .iter()
                .enumerate()
                .map(|(i, &name)| PhaseSegment { name, start_idx: i, end_idx: i + 1 })
                .collect(),
        };
        let stats = summarize_cycle(&frames, &cycle);
        assert_eq!(stats.len(), 8);
        for (i, stat) in stats.iter().enumerate() {
            assert_eq!(stat.phase, Phase::ALL[i]);
            assert_eq!(stat.hip, Some(i as f32));
        }
    }

    #[test]
    fn test_phase_stat_null_serialization() {
        let stat = PhaseStat { phase: Phase::ISw, hip: Some(150.0), knee: None, ankle: Some(95.0) };
        let json = serde_json::to_value(stat).unwrap();
        assert_eq!(json["phase"], serde_json::json!("ISw"));
        assert!(json["knee"].is_null());
        assert_eq!(json["hip"], serde_json::json!(150.0));
    }
}

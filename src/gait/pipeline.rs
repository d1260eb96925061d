use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cycle::{frame_times, CycleDetector};
use super::phase::{segment_cycle, GaitCycle, PercentPartitioner, PhasePartitioner};
use super::sample::FrameSample;
use super::smooth::smooth;
use super::summary::{summarize_cycle, PhaseStat};
use crate::config::Config;

/// 解析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaitReport {
    /// 入力フレーム数
    pub frame_count: usize,
    /// 接地フレームのインデックス
    pub strikes: Vec<usize>,
    /// 完全な歩行周期 (先頭・末尾の不完全な周期は含まない)
    pub cycles: Vec<GaitCycle>,
    /// 最初の完全な周期の相ごとの中央値。周期がなければ空
    pub phase_stats: Vec<PhaseStat>,
}

impl GaitReport {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// 平滑化 → 周期検出 → 相分割 → 集計
pub struct GaitAnalyzer {
    smoothing_window: usize,
    detector: CycleDetector,
    partitioner: Box<dyn PhasePartitioner>,
}

impl GaitAnalyzer {
    pub fn new(smoothing_window: usize, detector: CycleDetector) -> Self {
        Self {
            smoothing_window,
            detector,
            partitioner: Box::new(PercentPartitioner::default()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let table = config.phase.table()?;
        Ok(Self::new(config.smooth.window, CycleDetector::from_config(&config.cycle))
            .with_partitioner(PercentPartitioner::new(table)))
    }

    /// 相分割の方式を差し替える
    pub fn with_partitioner<P: PhasePartitioner + 'static>(mut self, partitioner: P) -> Self {
        self.partitioner = Box::new(partitioner);
        self
    }

    /// 全関節と yAnkle を平滑化したフレーム列
    pub fn smooth_frames(&self, frames: &[FrameSample]) -> Vec<FrameSample> {
        let w = self.smoothing_window;
        let hip = smooth(&column(frames, |f| f.hip), w);
        let knee = smooth(&column(frames, |f| f.knee), w);
        let ankle = smooth(&column(frames, |f| f.ankle), w);
        let y_ankle = smooth(&column(frames, |f| f.y_ankle), w);

        frames
            .iter()
            .enumerate()
            .map(|(i, f)| FrameSample {
                hip: hip[i],
                knee: knee[i],
                ankle: ankle[i],
                y_ankle: y_ankle[i],
                ..*f
            })
            .collect()
    }

    pub fn analyze(&self, frames: &[FrameSample], fps: f32) -> GaitReport {
        let smoothed = self.smooth_frames(frames);
        let y_ankle = column(&smoothed, |f| f.y_ankle);

        let times = timeline(frames, fps);

        let strikes = self.detector.detect_strikes(&y_ankle, &times);
        let cycles: Vec<GaitCycle> = self
            .detector
            .cycles_from_strikes(&strikes, &times)
            .into_iter()
            .map(|range| segment_cycle(self.partitioner.as_ref(), range, &smoothed))
            .collect();

        let phase_stats = match cycles.first() {
            Some(first) => summarize_cycle(&smoothed, first),
            None => {
                info!(frames = frames.len(), "clip too short to find a full gait cycle");
                Vec::new()
            }
        };

        debug!(frames = frames.len(), strikes = strikes.len(), cycles = cycles.len(), "gait analysis done");

        GaitReport {
            frame_count: frames.len(),
            strikes,
            cycles,
            phase_stats,
        }
    }
}

fn column(frames: &[FrameSample], value: impl Fn(&FrameSample) -> f32) -> Vec<f32> {
    frames.iter().map(value).collect()
}

/// 周期検出に使う時刻列。`t` が狭義単調増加でなければ `i / fps` で代用する
fn timeline(frames: &[FrameSample], fps: f32) -> Vec<f32> {
    let usable = frames.iter().all(|f| f.t.is_finite()) && frames.windows(2).all(|w| w[1].t > w[0].t);
    if usable {
        return column(frames, |f| f.t);
    }
    if !(fps.is_finite() && fps > 0.0) {
        warn!(fps, "timestamps unusable and frame rate invalid, no cycles can be timed");
    } else {
        debug!(fps, "timestamps not increasing, using frame rate");
    }
    frame_times(frames.len(), fps)
}

impl Default for GaitAnalyzer {
    fn default() -> Self {
        Self::new(crate::config::SmoothConfig::default().window, CycleDetector::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gait::cycle::CycleRange;
    use crate::gait::phase::{Phase, PhaseSegment};
    use crate::pose::Side;

    fn running_frames(n: usize, fps: f32) -> Vec<FrameSample> {
        (0..n)
            .map(|i| {
                let t = i as f32 / fps;
                let phase = std::f32::consts::TAU * t;
                FrameSample {
                    t,
                    hip: 160.0 + 10.0 * phase.cos(),
                    knee: 130.0 + 30.0 * phase.sin(),
                    ankle: 95.0 + 8.0 * phase.cos(),
                    side: Side::Right,
                    y_ankle: 0.8 + 0.05 * phase.sin(),
                }
            })
            .collect()
    }

    #[test]
    fn test_smooth_frames_keeps_time_and_side() {
        let analyzer = GaitAnalyzer::default();
        let frames = running_frames(20, 30.0);
        let smoothed = analyzer.smooth_frames(&frames);
        assert_eq!(smoothed.len(), frames.len());
        for (a, b) in smoothed.iter().zip(frames.iter()) {
            assert_eq!(a.t, b.t);
            assert_eq!(a.side, b.side);
        }
    }

    #[test]
    fn test_empty_input() {
        let report = GaitAnalyzer::default().analyze(&[], 30.0);
        assert_eq!(report.frame_count, 0);
        assert!(!report.has_cycles());
        assert!(report.phase_stats.is_empty());
    }

    #[test]
    fn test_short_clip_no_cycles() {
        let frames = running_frames(30, 30.0);
        let report = GaitAnalyzer::default().analyze(&frames, 30.0);
        assert!(report.cycles.is_empty());
        assert!(report.phase_stats.is_empty());
        assert_eq!(report.frame_count, 30);
    }

    #[test]
    fn test_stats_cover_first_cycle() {
        let frames = running_frames(120, 30.0);
        let report = GaitAnalyzer::default().analyze(&frames, 30.0);
        assert_eq!(report.cycles.len(), 3);
        assert_eq!(report.phase_stats.len(), Phase::COUNT);
        for (stat, seg) in report.phase_stats.iter().zip(report.cycles[0].phases.iter()) {
            assert_eq!(stat.phase, seg.name);
        }
    }

    struct WholeCycleAsIc;

    impl PhasePartitioner for WholeCycleAsIc {
        fn partition(&self, cycle: CycleRange, _frames: &[FrameSample]) -> Vec<PhaseSegment> {
            Phase::ALL
                .iter()
                .map(|&name| {
                    let start = if name == Phase::Ic { cycle.start } else { cycle.end };
                    PhaseSegment { name, start_idx: start, end_idx: cycle.end }
                })
                .collect()
        }
    }

    #[test]
    fn test_custom_partitioner_injected() {
        let frames = running_frames(120, 30.0);
        let analyzer = GaitAnalyzer::default().with_partitioner(WholeCycleAsIc);
        let report = analyzer.analyze(&frames, 30.0);
        assert!(report.has_cycles());
        let first = &report.cycles[0];
        assert_eq!(first.phases[0].start_idx, first.cycle_start);
        assert_eq!(first.phases[0].end_idx, first.cycle_end);
        assert!(report.phase_stats[0].knee.is_some());
        assert!(report.phase_stats[1].knee.is_none());
    }

    #[test]
    fn test_tracking_gap_not_reported_as_cycle() {
        // 51 フレーム目以降、4 秒分の検出失敗で時刻が飛んでいる
        let mut frames = running_frames(120, 30.0);
        for f in frames.iter_mut().skip(51) {
            f.t += 4.0;
        }
        let report = GaitAnalyzer::default().analyze(&frames, 30.0);
        assert_eq!(report.cycles.len(), 2, "cycles={:?}", report.cycles);
        for cycle in &report.cycles {
            let duration = frames[cycle.cycle_end].t - frames[cycle.cycle_start].t;
            assert!(duration <= 2.0, "duration={}", duration);
            assert!(cycle.phases.iter().all(|p| !p.is_empty()), "{:?}", cycle.phases);
        }
        assert!(report.phase_stats.iter().all(|s| s.knee.is_some()));
    }

    #[test]
    fn test_non_increasing_times_use_fps() {
        let mut frames = running_frames(120, 30.0);
        for f in frames.iter_mut() {
            f.t = 0.0;
        }
        let report = GaitAnalyzer::default().analyze(&frames, 30.0);
        assert_eq!(report.cycles.len(), 3);
    }

    #[test]
    fn test_from_config() {
        let config = Config::default();
        let analyzer = GaitAnalyzer::from_config(&config).unwrap();
        let report = analyzer.analyze(&running_frames(90, 30.0), 30.0);
        assert_eq!(report.cycles.len(), 2);
    }

    #[test]
    fn test_report_serialization() {
        let frames = running_frames(90, 30.0);
        let report = GaitAnalyzer::default().analyze(&frames, 30.0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["frameCount"], serde_json::json!(90));
        assert!(json["cycles"][0]["cycleStart"].is_number());
        assert_eq!(json["cycles"][0]["phases"][0]["name"], serde_json::json!("IC"));
        assert_eq!(json["phaseStats"].as_array().unwrap().len(), 8);
    }
}

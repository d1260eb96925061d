//! 足首の上下軌跡から接地 (foot strike) を検出し、歩行周期に分割する。
//!
//! 接地は `yAnkle` の局所極値として検出する。ランドマークのジッタによる偽の極値を
//! 落とすため、2つの制約をかける:
//! - 最小間隔: ケイデンス上限 (歩/分) から求めた秒数より近い極値は、
//!   プロミネンスの大きい方だけを残す
//! - 最小プロミネンス: 系列の値域に対する比率で指定
//!
//! 検出に失敗したフレームは欠落しているので、間隔と周期の長さはフレーム番号ではなく
//! 時刻で測る。クリップの端の点は、内部の接地と同じ高さに達していれば接地に数える。
//!
//! 1周期 = 同じ足の接地から次の接地まで = 2歩。

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::summary::median;
use crate::config::CycleConfig;

/// 接地とみなす極値の向き
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extremum {
    /// 極大。画像座標 (下向きが正) では足首の最下点が極大になる
    #[default]
    Peak,
    /// 極小。上向きが正の座標系で使う
    Valley,
}

/// 1歩行周期のフレーム範囲 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRange {
    pub start: usize,
    pub end: usize,
}

impl CycleRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 歩行周期検出器
#[derive(Debug, Clone)]
pub struct CycleDetector {
    config: CycleConfig,
}

impl CycleDetector {
    pub fn from_config(config: &CycleConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// 接地間の最小間隔（秒）。ケイデンス上限から
    pub fn min_separation_secs(&self) -> f32 {
        if self.config.max_cadence_spm > 0.0 && self.config.max_cadence_spm.is_finite() {
            120.0 / self.config.max_cadence_spm
        } else {
            0.0
        }
    }

    /// 1周期の最大の長さ（秒）。ケイデンス下限から。これより長い周期は捨てる
    pub fn max_cycle_secs(&self) -> f32 {
        if self.config.min_cadence_spm > 0.0 {
            120.0 / self.config.min_cadence_spm
        } else {
            f32::INFINITY
        }
    }

    /// 接地フレームのインデックスを昇順で返す
    ///
    /// `times` は各サンプルの時刻（秒）。検出失敗のフレームが抜けていても
    /// 間隔は時刻で測る。
    pub fn detect_strikes(&self, y_ankle: &[f32], times: &[f32]) -> Vec<usize> {
        if times.len() != y_ankle.len() {
            warn!(samples = y_ankle.len(), times = times.len(), "timestamp count mismatch");
            return Vec::new();
        }

        let signal: Vec<f32> = match self.config.strike {
            Extremum::Peak => y_ankle.to_vec(),
            Extremum::Valley => y_ankle.iter().map(|v| -v).collect(),
        };

        let Some(range) = finite_range(&signal) else {
            return Vec::new();
        };
        if range <= 0.0 {
            return Vec::new();
        }

        let min_prominence = self.config.min_prominence_ratio * range;
        let passes = |i: usize| {
            let p = prominence(&signal, i);
            let keep = p >= min_prominence;
            if !keep {
                debug!(index = i, prominence = p, min_prominence, "extremum rejected");
            }
            keep.then_some((i, p))
        };

        let candidates: Vec<(usize, f32)> = local_maxima(&signal).into_iter().filter_map(&passes).collect();
        let separation = self.min_separation_secs();
        let mut strikes = enforce_separation(&signal, times, &candidates, separation);

        // 端の極値は、内部の接地の高さ (中央値) に届くときだけ接地とみなす
        let reference = median(&strikes.iter().map(|&i| signal[i]).collect::<Vec<_>>());
        if let Some(reference) = reference {
            for edge in boundary_maxima(&signal) {
                let far_enough = strikes.iter().all(|&s| (times[s] - times[edge]).abs() >= separation);
                if signal[edge] >= reference && far_enough && passes(edge).is_some() {
                    debug!(index = edge, "strike at clip boundary");
                    strikes.push(edge);
                }
            }
            strikes.sort_unstable();
        }

        debug!(candidates = candidates.len(), strikes = strikes.len(), "strike detection");
        strikes
    }

    /// 連続する接地の組を周期にする。先頭・末尾の不完全な周期は含まれない
    ///
    /// 所要時間が `max_cycle_secs` を超える組 (停止・トラッキング喪失) は捨てる。
    pub fn cycles_from_strikes(&self, strikes: &[usize], times: &[f32]) -> Vec<CycleRange> {
        let max_secs = self.max_cycle_secs();
        // 等間隔フレームでちょうど上限に乗った場合の丸め誤差を吸収
        let limit = max_secs + max_secs * 1e-4;
        strikes
            .windows(2)
            .filter_map(|w| {
                let (Some(&t0), Some(&t1)) = (times.get(w[0]), times.get(w[1])) else {
                    return None;
                };
                let duration = t1 - t0;
                if duration <= limit {
                    Some(CycleRange::new(w[0], w[1]))
                } else {
                    debug!(start = w[0], end = w[1], duration, max_secs, "cycle too long, discarded");
                    None
                }
            })
            .collect()
    }

    pub fn detect_cycles(&self, y_ankle: &[f32], times: &[f32]) -> Vec<CycleRange> {
        let strikes = self.detect_strikes(y_ankle, times);
        self.cycles_from_strikes(&strikes, times)
    }
}

/// 等間隔フレームの時刻列 `i / fps`
pub fn frame_times(len: usize, fps: f32) -> Vec<f32> {
    (0..len).map(|i| i as f32 / fps).collect()
}

impl Default for CycleDetector {
    fn default() -> Self {
        Self::from_config(&CycleConfig::default())
    }
}

fn finite_range(signal: &[f32]) -> Option<f32> {
    let mut finite = signal.iter().copied().filter(|v| v.is_finite());
    let first = finite.next()?;
    let (min, max) = finite.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    Some(max - min)
}

/// 局所極大。平坦な頂上は中央のインデックス。両端と NaN は極大にならない
fn local_maxima(signal: &[f32]) -> Vec<usize> {
    let n = signal.len();
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        let v = signal[i];
        if !(v.is_finite() && signal[i - 1] < v) {
            i += 1;
            continue;
        }
        let mut j = i;
        while j + 1 < n && signal[j + 1] == v {
            j += 1;
        }
        if j + 1 < n && signal[j + 1] < v {
            peaks.push((i + j) / 2);
        }
        i = j + 1;
    }
    peaks
}

/// 端の極大: 端から続く同値の区間のすぐ内側が下がっていれば、その端の点
fn boundary_maxima(signal: &[f32]) -> Vec<usize> {
    let n = signal.len();
    let mut edges = Vec::new();
    if n < 2 {
        return edges;
    }
    if falls_away(signal[0], signal[1..].iter()) {
        edges.push(0);
    }
    if falls_away(signal[n - 1], signal[..n - 1].iter().rev()) {
        edges.push(n - 1);
    }
    edges
}

fn falls_away<'a>(edge: f32, inward: impl Iterator<Item = &'a f32>) -> bool {
    if !edge.is_finite() {
        return false;
    }
    inward.copied().find(|&v| v != edge).is_some_and(|v| v < edge)
}

/// 地形的プロミネンス
///
/// 左右それぞれ、より高い点 (または端) に当たるまでの最小値を求め、
/// 高い方の基準からの高さを返す。NaN は無視する。
fn prominence(signal: &[f32], peak: usize) -> f32 {
    let height = signal[peak];
    let left = (peak > 0).then(|| base_level(height, signal[..peak].iter().rev()));
    let right = (peak + 1 < signal.len()).then(|| base_level(height, signal[peak + 1..].iter()));
    match (left, right) {
        (Some(l), Some(r)) => height - l.max(r),
        // 端の点は内側だけで測る
        (Some(base), None) | (None, Some(base)) => height - base,
        (None, None) => 0.0,
    }
}

fn base_level<'a>(height: f32, side: impl Iterator<Item = &'a f32>) -> f32 {
    let mut min = height;
    for &v in side {
        if v > height {
            break;
        }
        if v < min {
            min = v;
        }
    }
    min
}

/// 近接する候補からプロミネンス (同値なら高さ) の大きいものを残す
fn enforce_separation(signal: &[f32], times: &[f32], candidates: &[(usize, f32)], min_separation: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        let (ia, pa) = candidates[a];
        let (ib, pb) = candidates[b];
        pb.total_cmp(&pa)
            .then(signal[ib].total_cmp(&signal[ia]))
            .then(ia.cmp(&ib))
    });

    let mut suppressed = vec![false; candidates.len()];
    let mut kept = Vec::new();
    for &k in &order {
        if suppressed[k] {
            continue;
        }
        let idx = candidates[k].0;
        kept.push(idx);
        for (other, &(j, _)) in candidates.iter().enumerate() {
            if other != k && (times[idx] - times[j]).abs() < min_separation {
                suppressed[other] = true;
            }
        }
    }

    kept.sort_unstable();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: f32 = 30.0;

    fn sine(periods: usize, frames_per_period: usize, amplitude: f32) -> Vec<f32> {
        (0..periods * frames_per_period)
            .map(|i| {
                let phase = i as f32 / frames_per_period as f32;
                0.7 + amplitude * (std::f32::consts::TAU * phase).sin()
            })
            .collect()
    }

    /// `peak_at` フレームで最大になる余弦波
    fn cosine(periods: usize, frames_per_period: usize, peak_at: usize) -> Vec<f32> {
        (0..periods * frames_per_period)
            .map(|i| {
                let phase = (i as f32 - peak_at as f32) / frames_per_period as f32;
                0.7 + 0.05 * (std::f32::consts::TAU * phase).cos()
            })
            .collect()
    }

    fn times(y: &[f32]) -> Vec<f32> {
        frame_times(y.len(), FPS)
    }

    #[test]
    fn test_limits_from_cadence() {
        let detector = CycleDetector::default();
        // 220歩/分 = 110周期/分
        assert!((detector.min_separation_secs() - 120.0 / 220.0).abs() < 1e-6);
        // 60歩/分 = 30周期/分 → 2秒
        assert_eq!(detector.max_cycle_secs(), 2.0);

        let open = CycleDetector::from_config(&CycleConfig {
            min_cadence_spm: 0.0,
            max_cadence_spm: 0.0,
            ..CycleConfig::default()
        });
        assert_eq!(open.min_separation_secs(), 0.0);
        assert_eq!(open.max_cycle_secs(), f32::INFINITY);
    }

    #[test]
    fn test_sine_yields_n_minus_one_cycles() {
        let detector = CycleDetector::default();
        for periods in 2..=6 {
            let y = sine(periods, 30, 0.05);
            let cycles = detector.detect_cycles(&y, &times(&y));
            assert_eq!(cycles.len(), periods - 1, "periods={}", periods);
            for c in &cycles {
                assert!(c.start < c.end);
                assert!((29..=31).contains(&c.len()), "cycle len={}", c.len());
            }
            for w in cycles.windows(2) {
                assert!(w[0].end <= w[1].start, "cycles overlap: {:?}", w);
            }
        }
    }

    #[test]
    fn test_phase_shifted_sine_yields_n_minus_one_cycles() {
        let detector = CycleDetector::default();
        for peak_at in [0, 5, 15, 22] {
            for periods in 2..=5 {
                let y = cosine(periods, 30, peak_at);
                let cycles = detector.detect_cycles(&y, &times(&y));
                assert_eq!(cycles.len(), periods - 1, "peak_at={} periods={}", peak_at, periods);
                for c in &cycles {
                    assert_eq!(c.len(), 30, "peak_at={} cycle={:?}", peak_at, c);
                }
            }
        }
    }

    #[test]
    fn test_strike_on_first_frame() {
        let detector = CycleDetector::default();
        let y = cosine(3, 30, 0);
        assert_eq!(detector.detect_strikes(&y, &times(&y)), vec![0, 30, 60]);

        let y = cosine(4, 30, 0);
        let cycles = detector.detect_cycles(&y, &times(&y));
        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[0], CycleRange::new(0, 30));
    }

    #[test]
    fn test_rising_clip_end_is_not_a_strike() {
        let detector = CycleDetector::default();
        // 最終フレームは次の山の1フレーム手前
        let y = cosine(3, 30, 0);
        let strikes = detector.detect_strikes(&y, &times(&y));
        assert!(!strikes.contains(&89), "strikes={:?}", strikes);
    }

    #[test]
    fn test_valley_convention() {
        let config = CycleConfig {
            strike: Extremum::Valley,
            ..CycleConfig::default()
        };
        let detector = CycleDetector::from_config(&config);
        let y = sine(4, 30, 0.05);
        let strikes = detector.detect_strikes(&y, &times(&y));
        assert_eq!(strikes.len(), 4);
        // 極小は周期の 3/4 付近
        for (k, &s) in strikes.iter().enumerate() {
            let expected = k * 30 + 22;
            assert!(s.abs_diff(expected) <= 1, "strike={} expected≈{}", s, expected);
        }
    }

    #[test]
    fn test_jitter_rejected() {
        let detector = CycleDetector::default();
        // ジッタ付きの正弦波: 小さな山が大量に出るが周期数は変わらない
        let mut y = sine(4, 30, 0.05);
        for (i, v) in y.iter_mut().enumerate() {
            *v += if i % 2 == 0 { 0.004 } else { -0.004 };
        }
        let t = times(&y);
        let strikes = detector.detect_strikes(&y, &t);
        assert_eq!(strikes.len(), 4, "strikes={:?}", strikes);
        for w in strikes.windows(2) {
            assert!(t[w[1]] - t[w[0]] >= detector.min_separation_secs());
        }
    }

    #[test]
    fn test_double_peak_within_separation() {
        let detector = CycleDetector::default();
        // 周期ごとに 4 フレーム離れた二重の山。高い方だけ残る
        let mut y = vec![0.0f32; 90];
        for k in 0..3 {
            let base = k * 30 + 5;
            y[base] = 0.8;
            y[base + 4] = 1.0;
        }
        let strikes = detector.detect_strikes(&y, &times(&y));
        assert_eq!(strikes, vec![9, 39, 69]);
    }

    #[test]
    fn test_separation_measured_in_time() {
        let detector = CycleDetector::default();
        // 山は 10 サンプル離れているが、間のフレームが抜けていて 1 秒離れている
        let mut y = vec![0.0f32; 30];
        y[5] = 1.0;
        y[15] = 0.9;
        y[25] = 1.0;
        let mut t = frame_times(30, FPS);
        for v in t.iter_mut().skip(10) {
            *v += 0.6;
        }
        for v in t.iter_mut().skip(20) {
            *v += 0.6;
        }
        assert_eq!(detector.detect_strikes(&y, &t), vec![5, 15, 25]);
        // 等間隔なら 0.33 秒しか離れていないので最も高い山以外は落ちる
        assert_eq!(detector.detect_strikes(&y, &frame_times(30, FPS)).len(), 2);
    }

    #[test]
    fn test_plateau_peak_middle() {
        assert_eq!(local_maxima(&[0.0, 1.0, 1.0, 1.0, 0.0]), vec![2]);
        assert_eq!(local_maxima(&[0.0, 1.0, 1.0, 0.0]), vec![1]);
        // 端まで続く平坦部は内部の極大ではない
        assert!(local_maxima(&[0.0, 1.0, 1.0]).is_empty());
        assert!(local_maxima(&[1.0, 0.0, 1.0]).is_empty());
    }

    #[test]
    fn test_boundary_maxima() {
        assert_eq!(boundary_maxima(&[1.0, 0.0, 1.0]), vec![0, 2]);
        assert_eq!(boundary_maxima(&[1.0, 1.0, 0.5, 0.7]), vec![0, 3]);
        assert!(boundary_maxima(&[0.0, 1.0, 0.0]).is_empty());
        assert!(boundary_maxima(&[0.5, 0.5, 0.5]).is_empty());
        assert!(boundary_maxima(&[f32::NAN, 1.0, 0.5]).is_empty());
        assert!(boundary_maxima(&[0.5, f32::NAN, 0.0]).is_empty());
        assert!(boundary_maxima(&[1.0]).is_empty());
    }

    #[test]
    fn test_nan_never_peak() {
        let y = [0.0, 0.5, f32::NAN, 0.5, 0.0];
        assert!(local_maxima(&y).is_empty());
        let y = [0.0, 1.0, 0.0, f32::NAN, 0.0, 1.0, 0.0];
        assert_eq!(local_maxima(&y), vec![1, 5]);
    }

    #[test]
    fn test_prominence() {
        let y = [0.0, 2.0, 1.0, 3.0, 0.5];
        // 2.0 の山: 右に 3.0 があるので右の基準は 1.0、左は 0.0 → 2.0 - 1.0
        assert_eq!(prominence(&y, 1), 1.0);
        // 最高点: 左右の最小は 0.0 と 0.5 → 3.0 - 0.5
        assert_eq!(prominence(&y, 3), 2.5);
        // 端は内側だけ
        assert_eq!(prominence(&[3.0, 1.0, 2.0], 0), 2.0);
        assert_eq!(prominence(&[1.0, 0.5, 2.0], 2), 1.5);
    }

    #[test]
    fn test_too_short_clip_yields_no_cycles() {
        let detector = CycleDetector::default();
        let y = sine(1, 30, 0.05);
        assert!(detector.detect_cycles(&y, &times(&y)).is_empty());
        assert!(detector.detect_cycles(&[], &[]).is_empty());
        assert!(detector.detect_cycles(&[0.5; 40], &frame_times(40, FPS)).is_empty());
        assert!(detector.detect_cycles(&[f32::NAN; 40], &frame_times(40, FPS)).is_empty());
    }

    #[test]
    fn test_mismatched_times_rejected() {
        let detector = CycleDetector::default();
        let y = sine(3, 30, 0.05);
        assert!(detector.detect_strikes(&y, &frame_times(10, FPS)).is_empty());
    }

    #[test]
    fn test_long_cycle_discarded() {
        let detector = CycleDetector::default();
        let t = frame_times(200, FPS);
        let cycles = detector.cycles_from_strikes(&[10, 40, 140, 170], &t);
        assert_eq!(cycles, vec![CycleRange::new(10, 40), CycleRange::new(140, 170)]);
        // ちょうど 2 秒は残す
        assert_eq!(detector.cycles_from_strikes(&[0, 60], &t), vec![CycleRange::new(0, 60)]);
    }

    #[test]
    fn test_tracking_gap_cycle_discarded() {
        let detector = CycleDetector::default();
        // インデックスでは 30 フレームだが、途中で 4 秒分のフレームが抜けている
        let mut t = frame_times(120, FPS);
        for v in t.iter_mut().skip(51) {
            *v += 4.0;
        }
        let cycles = detector.cycles_from_strikes(&[7, 37, 67, 97], &t);
        assert_eq!(cycles, vec![CycleRange::new(7, 37), CycleRange::new(67, 97)]);
    }
}

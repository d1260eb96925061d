//! 歩行周期を8つの相に分割する。
//!
//! 単眼2D映像からは離地 (toe-off) を安定して検出できないため、既定では
//! 周期の所要時間に対する固定比率で相境界を置く。境界の決め方は
//! [`PhasePartitioner`] として差し替えられる。

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::cycle::CycleRange;
use super::sample::FrameSample;

/// 歩行周期の相
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Initial Contact
    #[serde(rename = "IC")]
    Ic,
    /// Loading Response
    #[serde(rename = "LR")]
    Lr,
    /// Mid Stance
    #[serde(rename = "MS")]
    Ms,
    /// Terminal Stance
    #[serde(rename = "TS")]
    Ts,
    /// Pre-Swing
    #[serde(rename = "PSw")]
    PSw,
    /// Initial Swing
    #[serde(rename = "ISw")]
    ISw,
    /// Mid Swing
    #[serde(rename = "MidSw")]
    MidSw,
    /// Terminal Swing
    #[serde(rename = "TSw")]
    TSw,
}

impl Phase {
    pub const COUNT: usize = 8;

    pub const ALL: [Phase; Phase::COUNT] = [
        Phase::Ic,
        Phase::Lr,
        Phase::Ms,
        Phase::Ts,
        Phase::PSw,
        Phase::ISw,
        Phase::MidSw,
        Phase::TSw,
    ];

    pub fn abbreviation(self) -> &'static str {
        match self {
            Phase::Ic => "IC",
            Phase::Lr => "LR",
            Phase::Ms => "MS",
            Phase::Ts => "TS",
            Phase::PSw => "PSw",
            Phase::ISw => "ISw",
            Phase::MidSw => "MidSw",
            Phase::TSw => "TSw",
        }
    }

    pub fn full_name(self) -> &'static str {
        match self {
            Phase::Ic => "Initial Contact",
            Phase::Lr => "Loading Response",
            Phase::Ms => "Mid Stance",
            Phase::Ts => "Terminal Stance",
            Phase::PSw => "Pre-Swing",
            Phase::ISw => "Initial Swing",
            Phase::MidSw => "Mid Swing",
            Phase::TSw => "Terminal Swing",
        }
    }
}

/// 1相分のフレーム範囲 `[start_idx, end_idx)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSegment {
    pub name: Phase,
    pub start_idx: usize,
    pub end_idx: usize,
}

impl PhaseSegment {
    pub fn len(&self) -> usize {
        self.end_idx.saturating_sub(self.start_idx)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 歩行周期 (接地から次の接地まで) と、その相分割
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaitCycle {
    pub cycle_start: usize,
    pub cycle_end: usize,
    pub phases: Vec<PhaseSegment>,
}

impl GaitCycle {
    pub fn range(&self) -> CycleRange {
        CycleRange::new(self.cycle_start, self.cycle_end)
    }
}

/// 周期を相に分割する方式
///
/// 返す相は `Phase::ALL` の順で、連続・非重複かつ和集合が周期範囲と一致すること。
pub trait PhasePartitioner: Send + Sync {
    fn partition(&self, cycle: CycleRange, frames: &[FrameSample]) -> Vec<PhaseSegment>;
}

/// 相境界表: 2相目以降の開始位置 (周期に対する比率)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTable {
    boundaries: [f32; Phase::COUNT - 1],
}

impl PhaseTable {
    /// 文献値: IC 0-2%, LR 2-12%, MS 12-35%, TS 35-50%, PSw 50-62%,
    /// ISw 62-75%, MidSw 75-87%, TSw 87-100%
    pub const RUNNING_DEFAULT: [f32; Phase::COUNT - 1] = [0.02, 0.12, 0.35, 0.50, 0.62, 0.75, 0.87];

    /// 境界は (0, 1) の範囲で狭義単調増加でなければならない
    pub fn new(boundaries: [f32; Phase::COUNT - 1]) -> Result<Self> {
        let mut prev = 0.0f32;
        for (i, &b) in boundaries.iter().enumerate() {
            if !b.is_finite() || b <= prev || b >= 1.0 {
                bail!(
                    "invalid phase boundary #{} ({}): boundaries must increase strictly within (0, 1)",
                    i,
                    b
                );
            }
            prev = b;
        }
        Ok(Self { boundaries })
    }

    /// パーセント表記 (例: `[2.0, 12.0, ...]`) から作成
    pub fn from_percent(percent: [f32; Phase::COUNT - 1]) -> Result<Self> {
        Self::new(percent.map(|p| p / 100.0))
    }

    pub fn boundaries(&self) -> &[f32; Phase::COUNT - 1] {
        &self.boundaries
    }
}

impl Default for PhaseTable {
    fn default() -> Self {
        Self {
            boundaries: Self::RUNNING_DEFAULT,
        }
    }
}

/// 周期の所要時間に対する固定比率で分割する
///
/// 相の開始は「境界時刻に達した最初のフレーム」。フレームの時刻が使えない場合
/// (範囲外・非単調) はフレーム数に対する比率で代用する。
#[derive(Debug, Clone, Default)]
pub struct PercentPartitioner {
    table: PhaseTable,
}

impl PercentPartitioner {
    pub fn new(table: PhaseTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PhaseTable {
        &self.table
    }

    fn cuts_by_time(&self, cycle: CycleRange, frames: &[FrameSample]) -> Option<Vec<usize>> {
        // 周期の終端時刻 = 次の接地フレームの時刻
        if cycle.is_empty() {
            return None;
        }
        let t_start = frames.get(cycle.start)?.t;
        let t_end = frames.get(cycle.end)?.t;
        let times = &frames[cycle.start..=cycle.end];
        let monotonic = times.windows(2).all(|w| w[0].t.is_finite() && w[1].t > w[0].t);
        if !monotonic {
            return None;
        }

        let duration = t_end - t_start;
        // 等間隔フレームで境界ちょうどに乗った場合の丸め誤差を吸収
        let eps = duration * 1e-4;
        let cuts = self
            .table
            .boundaries
            .iter()
            .map(|&b| {
                let boundary = t_start + b * duration - eps;
                let offset = frames[cycle.start..cycle.end].partition_point(|f| f.t < boundary);
                cycle.start + offset
            })
            .collect();
        Some(cuts)
    }

    fn cuts_by_count(&self, cycle: CycleRange) -> Vec<usize> {
        let len = cycle.len() as f32;
        self.table
            .boundaries
            .iter()
            .map(|&b| cycle.start + (b * len).round() as usize)
            .collect()
    }
}

impl PhasePartitioner for PercentPartitioner {
    fn partition(&self, cycle: CycleRange, frames: &[FrameSample]) -> Vec<PhaseSegment> {
        let interior = self
            .cuts_by_time(cycle, frames)
            .unwrap_or_else(|| self.cuts_by_count(cycle));

        let end = cycle.end.max(cycle.start);
        let mut starts = Vec::with_capacity(Phase::COUNT + 1);
        starts.push(cycle.start);
        let mut prev = cycle.start;
        for cut in interior {
            prev = cut.clamp(prev, end);
            starts.push(prev);
        }
        starts.push(end);

        Phase::ALL
            .iter()
            .zip(starts.windows(2))
            .map(|(&name, w)| PhaseSegment {
                name,
                start_idx: w[0],
                end_idx: w[1],
            })
            .collect()
    }
}

/// 1周期を分割して `GaitCycle` にする
pub fn segment_cycle(
    partitioner: &dyn PhasePartitioner,
    cycle: CycleRange,
    frames: &[FrameSample],
) -> GaitCycle {
    GaitCycle {
        cycle_start: cycle.start,
        cycle_end: cycle.end,
        phases: partitioner.partition(cycle, frames),
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::gait::cycle::Extremum;
use crate::gait::phase::PhaseTable;
use crate::pose::{PoseModel, Side};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub smooth: SmoothConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub phase: PhaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// 解析フレームレート
    #[serde(default = "default_fps")]
    pub fps: f32,
    /// 解析する最大の長さ（秒）
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f32,
    /// 解析する脚
    #[serde(default)]
    pub side: Side,
    /// キーポイント信頼度の閾値
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// 姿勢推定モデルの種類
    #[serde(default)]
    pub model: PoseModel,
    /// 姿勢推定モデル (ONNX)
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
}

fn default_fps() -> f32 { 30.0 }
fn default_max_duration_secs() -> f32 { 6.0 }
fn default_confidence_threshold() -> f32 { 0.3 }
fn default_model_path() -> PathBuf { PathBuf::from("models/spinepose_medium.onnx") }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            max_duration_secs: default_max_duration_secs(),
            side: Side::default(),
            confidence_threshold: default_confidence_threshold(),
            model: PoseModel::default(),
            model_path: default_model_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmoothConfig {
    /// 移動平均の窓幅（フレーム）。1 で平滑化なし
    #[serde(default = "default_smooth_window")]
    pub window: usize,
}

fn default_smooth_window() -> usize { 5 }

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            window: default_smooth_window(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CycleConfig {
    /// 接地とみなす yAnkle の極値
    #[serde(default)]
    pub strike: Extremum,
    /// ケイデンス下限（歩/分）。これより遅い周期は捨てる
    #[serde(default = "default_min_cadence")]
    pub min_cadence_spm: f32,
    /// ケイデンス上限（歩/分）。接地間の最小間隔を決める
    #[serde(default = "default_max_cadence")]
    pub max_cadence_spm: f32,
    /// 最小プロミネンス（yAnkle の値域に対する比率）
    #[serde(default = "default_min_prominence_ratio")]
    pub min_prominence_ratio: f32,
}

fn default_min_cadence() -> f32 { 60.0 }
fn default_max_cadence() -> f32 { 220.0 }
fn default_min_prominence_ratio() -> f32 { 0.2 }

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            strike: Extremum::default(),
            min_cadence_spm: default_min_cadence(),
            max_cadence_spm: default_max_cadence(),
            min_prominence_ratio: default_min_prominence_ratio(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PhaseConfig {
    /// LR〜TSw の開始位置（周期に対する %）
    #[serde(default = "default_phase_boundaries")]
    pub boundaries_percent: [f32; 7],
}

fn default_phase_boundaries() -> [f32; 7] {
    [2.0, 12.0, 35.0, 50.0, 62.0, 75.0, 87.0]
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            boundaries_percent: default_phase_boundaries(),
        }
    }
}

impl PhaseConfig {
    pub fn table(&self) -> Result<PhaseTable> {
        PhaseTable::from_percent(self.boundaries_percent).context("invalid [phase] boundaries_percent")
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.phase.table()?;
        Ok(config)
    }

    /// 読み込めなければデフォルト値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config not found, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }
}

use anyhow::{bail, Context, Result};
use gait_phase::config::Config;
use gait_phase::gait::{FrameSample, GaitAnalyzer};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

/// Usage: gait-phase [--verbose] [--config PATH] [--fps N] [samples.json]
///
/// samples.json を省略すると標準入力から FrameSample の JSON 配列を読む。
struct Args {
    verbose: bool,
    config: PathBuf,
    fps: Option<f32>,
    input: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        verbose: false,
        config: PathBuf::from(CONFIG_PATH),
        fps: None,
        input: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => args.verbose = true,
            "--config" => {
                args.config = iter.next().context("--config needs a path")?.into();
            }
            "--fps" => {
                let value = iter.next().context("--fps needs a value")?;
                args.fps = Some(value.parse().with_context(|| format!("invalid fps: {}", value))?);
            }
            other if other.starts_with('-') => bail!("unknown option: {}", other),
            path => args.input = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

fn read_samples(input: Option<&PathBuf>) -> Result<Vec<FrameSample>> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read samples: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("samples must be a JSON array of frame samples")
}

/// `--fps` が優先、なければ `[capture] fps`
fn resolve_fps(arg: Option<f32>, config: &Config) -> Result<f32> {
    let fps = arg.unwrap_or(config.capture.fps);
    if !(fps.is_finite() && fps > 0.0) {
        bail!("fps must be a positive finite number, got {}", fps);
    }
    Ok(fps)
}

fn main() -> Result<()> {
    let args = parse_args()?;

    // ログは stderr に出し、stdout はレポート専用
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();

    info!("gait-phase ({})", env!("GAIT_PHASE_VERSION"));

    let config = Config::load_or_default(&args.config);
    let fps = resolve_fps(args.fps, &config)?;

    let samples = read_samples(args.input.as_ref())?;
    info!(samples = samples.len(), fps, "analyzing");

    let analyzer = GaitAnalyzer::from_config(&config)?;
    let report = analyzer.analyze(&samples, fps);
    if !report.has_cycles() {
        warn!("no complete gait cycle found");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_fps() {
        let config = Config::default();
        assert_eq!(resolve_fps(None, &config).unwrap(), 30.0);
        assert_eq!(resolve_fps(Some(60.0), &config).unwrap(), 60.0);
        assert!(resolve_fps(Some(0.0), &config).is_err());
        assert!(resolve_fps(Some(-30.0), &config).is_err());
        assert!(resolve_fps(Some(f32::INFINITY), &config).is_err());
        assert!(resolve_fps(Some(f32::NAN), &config).is_err());
    }
}

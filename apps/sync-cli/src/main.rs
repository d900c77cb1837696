use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

use vision_sync::io::OutputFormat;
use vision_sync::monitor::{CancelToken, ConsoleMonitor, Monitor};
use vision_sync::skew::SkewMode;
use vision_sync::stamp::SystemClock;
use vision_sync::{MockConfig, MockFactory, Session, SessionConfig, SessionReport, SourceFactory};

#[derive(Parser, Debug)]
#[command(
    name = "dualcam",
    version,
    about = "Lock-step dual camera capture with skew measurement"
)]
struct Cli {
    /// Session config (YAML); flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Capture backend
    #[arg(long, value_enum, default_value_t = Backend::for_build())]
    backend: Backend,
    /// Directory under which the output folders are created
    #[arg(long)]
    output_root: Option<PathBuf>,
    /// Per-retrieve timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Acquisition profile loaded on both cameras
    #[arg(long)]
    profile: Option<String>,
    /// Blank gap between the two mosaics, in pixels
    #[arg(long)]
    gap_px: Option<u32>,
    /// Image file format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// How suffixes straddling a second boundary are compared
    #[arg(long, value_enum)]
    skew_mode: Option<SkewModeArg>,
    /// Stop cleanly after this many pairs
    #[arg(long)]
    max_frames: Option<u64>,
    /// Mock: number of enumerated devices
    #[arg(long, default_value_t = 2)]
    mock_devices: usize,
    /// Mock: frame size as WIDTHxHEIGHT
    #[arg(long, default_value = "640x480")]
    mock_size: String,
    /// Mock: frames per camera before retrieval times out
    #[arg(long)]
    mock_frames: Option<u64>,
    /// OpenCV: number of device indices to probe
    #[arg(long, default_value_t = 8)]
    probe: u32,
    /// Write the final session report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    Opencv,
}

impl Backend {
    fn for_build() -> Self {
        if cfg!(feature = "opencv") {
            Backend::Opencv
        } else {
            Backend::Mock
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
    Bmp,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Jpeg => OutputFormat::Jpeg,
            FormatArg::Bmp => OutputFormat::Bmp,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum SkewModeArg {
    Suffix,
    WrapAware,
}

impl From<SkewModeArg> for SkewMode {
    fn from(m: SkewModeArg) -> Self {
        match m {
            SkewModeArg::Suffix => SkewMode::Suffix,
            SkewModeArg::WrapAware => SkewMode::WrapAware,
        }
    }
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    // Resolve the local offset before the signal handler thread exists.
    let clock = SystemClock::new();
    let config = build_config(&cli)?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("installing Ctrl-C handler")?;

    let report = match cli.backend {
        Backend::Mock => run_mock(&cli, config, clock, cancel)?,
        Backend::Opencv => run_opencv(&cli, config, clock, cancel)?,
    };

    for line in report.summary() {
        println!("{line}");
    }
    if let Some(path) = &cli.report {
        let file =
            File::create(path).with_context(|| format!("creating report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn build_config(cli: &Cli) -> Result<SessionConfig> {
    let mut cfg = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(root) = &cli.output_root {
        cfg.output_root = root.clone();
    }
    if let Some(t) = cli.timeout_ms {
        cfg.timeout_ms = t;
    }
    if let Some(p) = &cli.profile {
        cfg.profile = p.clone();
    }
    if let Some(g) = cli.gap_px {
        cfg.gap_px = g;
    }
    if let Some(f) = cli.format {
        cfg.image_format = f.into();
    }
    if let Some(m) = cli.skew_mode {
        cfg.skew_mode = m.into();
    }
    if cli.max_frames.is_some() {
        cfg.max_frames = cli.max_frames;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn parse_size(spec: &str) -> Result<(u32, u32)> {
    let (w, h) = spec
        .split_once('x')
        .ok_or_else(|| anyhow::anyhow!("size must be WIDTHxHEIGHT, e.g., 640x480"))?;
    let w: u32 = w.parse().map_err(|_| anyhow::anyhow!("invalid width"))?;
    let h: u32 = h.parse().map_err(|_| anyhow::anyhow!("invalid height"))?;
    if w == 0 || h == 0 {
        return Err(anyhow::anyhow!("size must be non-zero"));
    }
    Ok((w, h))
}

fn run_session<F: SourceFactory, M: Monitor>(
    factory: &F,
    config: SessionConfig,
    clock: SystemClock,
    monitor: M,
) -> Result<SessionReport> {
    let mut session = Session::new(config, clock, monitor)?;
    Ok(session.run(factory))
}

fn run_mock(
    cli: &Cli,
    config: SessionConfig,
    clock: SystemClock,
    cancel: CancelToken,
) -> Result<SessionReport> {
    let (width, height) = parse_size(&cli.mock_size)?;
    let factory = MockFactory::new(
        cli.mock_devices,
        MockConfig {
            width,
            height,
            frame_budget: cli.mock_frames,
            ..MockConfig::default()
        },
    );
    run_session(&factory, config, clock, ConsoleMonitor::new(cancel))
}

#[cfg(feature = "opencv")]
fn run_opencv(
    cli: &Cli,
    config: SessionConfig,
    clock: SystemClock,
    cancel: CancelToken,
) -> Result<SessionReport> {
    let factory = vision_sync::OpenCvFactory::new(cli.probe);
    let monitor = vision_sync::monitor::HighGuiMonitor::new("Merged Cameras", cancel);
    run_session(&factory, config, clock, monitor)
}

#[cfg(not(feature = "opencv"))]
fn run_opencv(
    _cli: &Cli,
    _config: SessionConfig,
    _clock: SystemClock,
    _cancel: CancelToken,
) -> Result<SessionReport> {
    Err(anyhow::anyhow!(
        "OpenCV backend not enabled at compile time; rebuild with --features opencv"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("640x480").unwrap(), (640, 480));
        assert!(parse_size("640").is_err());
        assert!(parse_size("0x480").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "dualcam",
            "--backend",
            "mock",
            "--timeout-ms",
            "100",
            "--skew-mode",
            "wrap-aware",
            "--max-frames",
            "3",
        ]);
        let cfg = build_config(&cli).unwrap();
        assert_eq!(cfg.timeout_ms, 100);
        assert_eq!(cfg.skew_mode, SkewMode::WrapAware);
        assert_eq!(cfg.max_frames, Some(3));
        assert_eq!(cfg.gap_px, 1500);
    }
}

mod logging;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use posture_engine::core_modules::stabilizer::CalibrationProgress;
use posture_engine::error::BaselineError;
use posture_engine::{
    EngineConfig, FrameReport, JsonFileStore, JsonLinesSource, MonitorSession, PoseFrame,
    run_calibration, run_monitor,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Replays pose-landmark recordings through the posture engine.
#[derive(Debug, Parser)]
#[command(name = "posture_tester", version, about)]
struct Cli {
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find a steady pose and save it as the baseline.
    Calibrate(SessionArgs),
    /// Score frames against the saved baseline and raise slouch alerts.
    Monitor {
        #[command(flatten)]
        session: SessionArgs,
        /// Print every evaluated frame, not only alert changes.
        #[arg(long)]
        every_frame: bool,
    },
    /// Print a configuration file to start from.
    Config {
        #[arg(long, value_enum, default_value_t = Preset::Default)]
        preset: Preset,
    },
}

#[derive(Debug, clap::Args)]
struct SessionArgs {
    /// JSON-lines landmark recording, or `-` for stdin.
    #[arg(short, long, default_value = "-")]
    input: String,
    #[arg(short, long, default_value = "posture_baseline.json")]
    baseline: PathBuf,
    /// TOML engine configuration. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    Default,
    Strict,
    Lenient,
}

impl Preset {
    fn config(self) -> EngineConfig {
        match self {
            Preset::Default => EngineConfig::default(),
            Preset::Strict => EngineConfig::strict(),
            Preset::Lenient => EngineConfig::lenient(),
        }
    }
}

type FrameReader = JsonLinesSource<Box<dyn BufRead + Send>>;

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level);

    // --- 2. Stop Signal ---
    // Ctrl-C ends calibration as an abort and monitoring as a clean finish.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; stopping after the current frame");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    // --- 3. Dispatch ---
    match cli.command {
        Command::Calibrate(args) => {
            let (config, mut source) = prepare(&args)?;
            let mut store = JsonFileStore::new(&args.baseline);
            let baseline = tokio::task::spawn_blocking(move || {
                run_calibration(&mut source, &config, &mut store, &stop, print_progress)
            })
            .await
            .context("calibration task panicked")?
            .context("calibration failed")?;

            println!("Calibration complete. Baseline saved to {}", args.baseline.display());
            for (axis, degrees) in baseline.iter() {
                println!("  {axis}: {degrees:.1}°");
            }
        }
        Command::Monitor { session, every_frame } => {
            let (config, mut source) = prepare(&session)?;
            let mut monitor = open_monitor(&config, &session.baseline)?;

            let summary = tokio::task::spawn_blocking(move || {
                run_monitor(&mut source, &mut monitor, Instant::now(), &stop, |frame, report| {
                    print_report(frame, report, every_frame)
                })
            })
            .await
            .context("monitoring task panicked")?
            .context("monitoring failed")?;

            println!(
                "Monitored {} frames ({} skipped, {} malformed): {} alerts, {} escalations, {} baseline adaptations",
                summary.frames,
                summary.skipped,
                summary.malformed,
                summary.alerts,
                summary.escalations,
                summary.adaptations
            );
        }
        Command::Config { preset } => {
            print!("{}", preset.config().to_toml()?);
        }
    }

    Ok(())
}

fn prepare(args: &SessionArgs) -> Result<(EngineConfig, FrameReader)> {
    let config = load_config(args.config.as_deref())?;
    let reader = open_input(&args.input)?;
    Ok((config, JsonLinesSource::new(reader)))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = EngineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Starts monitoring, failing fast with a calibration hint when no baseline exists.
fn open_monitor(config: &EngineConfig, baseline: &Path) -> Result<MonitorSession<JsonFileStore>> {
    match MonitorSession::start(config, JsonFileStore::new(baseline)) {
        Ok(monitor) => Ok(monitor),
        Err(BaselineError::NotFound(_)) => bail!(
            "baseline file {} not found; run `posture_tester calibrate` first",
            baseline.display()
        ),
        Err(e) => Err(e).with_context(|| format!("loading baseline {}", baseline.display())),
    }
}

fn open_input(input: &str) -> Result<Box<dyn BufRead + Send>> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).with_context(|| format!("opening input {input}"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn print_progress(progress: &CalibrationProgress) {
    if progress.window_fill < progress.window_capacity {
        return;
    }
    // Every tenth steady frame, plus the last one.
    if progress.stable_frames % 10 == 0 || progress.is_complete {
        println!(
            "Calibrating: {:>3.0}% steady ({}/{})",
            progress.fraction() * 100.0,
            progress.stable_frames,
            progress.stable_frames_required
        );
    }
}

fn print_report(frame: &PoseFrame, report: &FrameReport, every_frame: bool) {
    let FrameReport::Evaluated(posture) = report else {
        return;
    };
    let timer = &posture.timer;
    if !(every_frame || timer.transitioned || timer.newly_escalated) {
        return;
    }

    let offending: Vec<String> = posture
        .score
        .offending_axes()
        .map(|axis| axis.to_string())
        .collect();
    let score = posture
        .score
        .aggregate
        .map_or_else(|| "--".to_string(), |s| s.to_string());
    println!(
        "[{:>8.2}s] {:<38} score {:>3} {}",
        frame.elapsed().as_secs_f64(),
        timer.alert.message(),
        score,
        offending.join(",")
    );
    if posture.persist_failed {
        warn!("adapted baseline could not be saved; continuing with it in memory");
    }
}

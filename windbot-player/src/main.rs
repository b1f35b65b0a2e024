//! windbot - Main entry point
//!
//! `preprocess` compiles a timeline into an execution sequence file, `play`
//! replays one on the rig, `inspect` validates one and prints its metadata.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use windbot_common::config::{resolve_config_path, RigConfig};
use windbot_common::fingering::{FingeringMap, InstrumentKind};
use windbot_common::preprocess::{exec_file_name, resolve_bpm, SequencePreprocessor};
use windbot_common::sequence::ExecutionSequence;
use windbot_common::time::format_seconds;
use windbot_common::timeline::Timeline;
use windbot_player::transport::Transports;
use windbot_player::{ExecutionEngine, PlaybackController, PlaybackOptions};

/// Command-line arguments for windbot
#[derive(Parser, Debug)]
#[command(name = "windbot")]
#[command(about = "Preprocess and replay note sequences on the wind instrument rig")]
#[command(version)]
struct Args {
    /// Rig configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a timeline into an execution sequence file
    Preprocess {
        /// Timeline JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Fingering map (YAML); defaults to the instrument's configured map
        #[arg(short, long)]
        fingering: Option<PathBuf>,

        /// Instrument profile to use
        #[arg(long, default_value = "secondary")]
        instrument: InstrumentKind,

        /// Tempo override
        #[arg(long)]
        bpm: Option<f64>,

        /// Tonguing delay override (ms)
        #[arg(long)]
        tongue: Option<u32>,

        /// Output file; defaults to a generated name inside --exec-dir
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for generated sequence files
        #[arg(long, env = "WINDBOT_EXEC_DIR", default_value = ".")]
        exec_dir: PathBuf,
    },

    /// Replay an execution sequence (Ctrl+C stops and releases the rig)
    Play {
        /// Execution sequence file
        file: PathBuf,
    },

    /// Validate an execution sequence and print its metadata
    Inspect {
        /// Execution sequence file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Inspect works without a rig configuration
    let config = match &args.command {
        Command::Inspect { .. } => None,
        _ => {
            let path = resolve_config_path(args.config.as_deref())?;
            let config = RigConfig::load(&path)
                .with_context(|| format!("Failed to load rig configuration {}", path.display()))?;
            Some((path, config))
        }
    };

    // Initialize tracing
    let level = config
        .as_ref()
        .map(|(_, c)| c.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("windbot={0},windbot_player={0},windbot_common={0}", level).into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some((path, _)) = &config {
        info!("Rig configuration: {}", path.display());
    }

    match (args.command, config) {
        (Command::Inspect { file }, _) => inspect(&file),
        (
            Command::Preprocess {
                input,
                fingering,
                instrument,
                bpm,
                tongue,
                output,
                exec_dir,
            },
            Some((_, config)),
        ) => preprocess(&config, &input, fingering, instrument, bpm, tongue, output, &exec_dir),
        (Command::Play { file }, Some((_, config))) => play(&config, &file).await,
        (_, None) => anyhow::bail!("No rig configuration loaded"),
    }
}

#[allow(clippy::too_many_arguments)]
fn preprocess(
    config: &RigConfig,
    input: &Path,
    fingering: Option<PathBuf>,
    instrument: InstrumentKind,
    bpm: Option<f64>,
    tongue: Option<u32>,
    output: Option<PathBuf>,
    exec_dir: &Path,
) -> Result<()> {
    let timeline = Timeline::load(input)
        .with_context(|| format!("Failed to read timeline {}", input.display()))?;
    let bpm = resolve_bpm(bpm, config.bpm, &timeline)?;
    let delay = tongue.unwrap_or(config.tonguing_delay_ms);

    let fingering_path = fingering
        .or_else(|| config.fingering_path(instrument).map(Path::to_path_buf))
        .with_context(|| format!("No fingering map for {}: pass --fingering or set [fingering] in the config", instrument))?;
    let map = FingeringMap::load(&fingering_path)
        .with_context(|| format!("Failed to load fingering map {}", fingering_path.display()))?;

    info!(
        "Preprocessing {} for {} at {} BPM, tonguing delay {}ms",
        input.display(),
        instrument,
        bpm,
        delay
    );
    let preprocessor = SequencePreprocessor::new(config, instrument, map, bpm, delay)?;
    let source_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let sequence = preprocessor.generate(&timeline, &source_name)?;

    let output = output.unwrap_or_else(|| exec_dir.join(exec_file_name(input, instrument, bpm, delay)));
    sequence.save(&output)?;
    info!(
        "Wrote {} ({} events, {})",
        output.display(),
        sequence.events.len(),
        format_seconds(sequence.meta.total_duration_ms / 1000.0)
    );
    Ok(())
}

async fn play(config: &RigConfig, file: &Path) -> Result<()> {
    let sequence = ExecutionSequence::load(file)?;
    let options = PlaybackOptions::from_config(config, sequence.meta.instrument);
    let transports = Transports::from_config(config)
        .await
        .context("Failed to initialize transports")?;

    let controller = Arc::new(PlaybackController::new());
    let engine = Arc::new(ExecutionEngine::new(sequence, transports, options, controller.clone())?);

    let mut replay = engine.spawn().await?;
    let joined = tokio::select! {
        joined = &mut replay => joined,
        () = shutdown_signal() => {
            controller.request_stop().await;
            (&mut replay).await
        }
    };

    let status = controller.snapshot().await;
    match joined.context("Replay task failed")? {
        Ok(report) => {
            info!(
                "Done: {} of {} events in {}",
                report.events_dispatched,
                report.total_events,
                format_seconds(status.actual_duration)
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            info!(
                "Stopped at event {} of {}",
                status.current_note_index, status.total_notes
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn inspect(file: &Path) -> Result<()> {
    let sequence = ExecutionSequence::load(file)?;
    let meta = &sequence.meta;

    let rests = sequence.events.iter().filter(|e| e.is_rest()).count();
    let frames: usize = sequence.events.iter().map(|e| e.frames.len()).sum();

    println!("{}", serde_json::to_string_pretty(meta)?);
    println!(
        "{} events ({} rests, {} frames), {}",
        sequence.events.len(),
        rests,
        frames,
        format_seconds(meta.total_duration_ms / 1000.0)
    );
    Ok(())
}

/// Resolves on Ctrl+C (or SIGTERM on unix)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping playback");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping playback");
        },
    }
}

//! Cut livestream recordings into tagged per-song files.
//!
//! Reads a manifest of recordings and their song lists, checks every
//! recording's timing, then cuts and tags one file per song:
//!
//!   livecut streams.toml --artist "The Streamer" --output-dir music/
//!
//! Settings not given on the command line come from
//! ~/.state/livecut/defaults.toml (or --config). --save-defaults stores the
//! effective settings there.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use livecut::batch::{BatchJob, BatchResult, BatchRunner, BatchTotals, RecordingOutcome};
use livecut::config::{Config, Encoder};
use livecut::extract::{FfmpegExtractor, PcmExtractor, SegmentExtractor};
use livecut::ExtractError;
use livecut::manifest::Manifest;
use livecut::segmenter::SegmentOptions;

#[derive(Parser, Debug)]
#[command(name = "livecut", version, about = "Cut livestream recordings into tagged songs")]
struct Cli {
    /// Recording manifest (.toml or .json)
    manifest: Option<PathBuf>,

    /// Defaults file to use instead of ~/.state/livecut/defaults.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Artist written to every segment
    #[arg(long)]
    artist: Option<String>,

    /// Directory the per-recording folders are created in
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// auto, pcm (WAV via symphonia) or ffmpeg (MP3)
    #[arg(short, long)]
    encoder: Option<Encoder>,

    /// Path to the ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Seconds added after a song's declared length
    #[arg(long)]
    pad: Option<u64>,

    /// Number of recordings processed in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Print the window plan without cutting anything
    #[arg(long)]
    dry_run: bool,

    /// Also write a CUE sheet per recording
    #[arg(long)]
    cue: bool,

    /// Write a JSON report of all outcomes to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Show the effective settings and exit
    #[arg(long)]
    show_config: bool,

    /// Save the effective settings as defaults
    #[arg(long)]
    save_defaults: bool,
}

impl Cli {
    fn overrides(&self) -> Config {
        Config {
            artist: self.artist.clone(),
            pad_seconds: self.pad,
            output_dir: self.output_dir.clone(),
            encoder: self.encoder,
            ffmpeg_path: self.ffmpeg.clone(),
            workers: self.workers,
            ..Config::default()
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.merge(&cli.overrides());
    Ok(config)
}

fn locate_ffmpeg(config: &Config) -> Result<FfmpegExtractor, ExtractError> {
    let ffmpeg = FfmpegExtractor::locate(config.ffmpeg_path.as_deref(), config.mp3_quality())?;
    info!("Using ffmpeg at {}", ffmpeg.tool().display());
    Ok(ffmpeg)
}

/// Build the batch runner for the configured encoder.
///
/// With `auto`, sources symphonia can read are cut to WAV and everything else
/// (webm/opus downloads) goes through ffmpeg. An explicit `pcm` or `ffmpeg`
/// is fatal before anything runs when a recording needs what it cannot do.
fn make_runner(config: &Config, options: SegmentOptions, jobs: &[BatchJob]) -> Result<BatchRunner> {
    let workers = config.workers();
    let pcm = PcmExtractor::new();
    let unreadable: Vec<String> = jobs
        .iter()
        .map(|job| job.recording.container())
        .filter(|container| !pcm.supports(container))
        .collect();

    let runner = match config.encoder() {
        Encoder::Ffmpeg => {
            let ffmpeg = locate_ffmpeg(config).context("ffmpeg encoder selected")?;
            BatchRunner::new(options, Arc::new(ffmpeg), workers)
        }
        Encoder::Pcm => {
            if let Some(container) = unreadable.first() {
                anyhow::bail!(
                    "pcm encoder selected but .{} sources need ffmpeg (use --encoder auto or ffmpeg)",
                    container
                );
            }
            BatchRunner::new(options, Arc::new(pcm), workers)
        }
        Encoder::Auto => {
            let runner = BatchRunner::new(options, Arc::new(pcm), workers);
            if unreadable.is_empty() {
                runner
            } else {
                let ffmpeg = locate_ffmpeg(config)
                    .with_context(|| format!(".{} sources need ffmpeg", unreadable.join(", .")))?;
                runner.with_fallback(Arc::new(ffmpeg))
            }
        }
    };
    Ok(runner.with_skip_titles(config.skip_titles()))
}

fn print_result(result: &BatchResult, dry_run: bool) {
    println!("{}", result.recording);
    match &result.outcome {
        RecordingOutcome::Completed(report) => {
            if dry_run {
                for planned in &report.planned {
                    println!(
                        "  {:>5}  {} -> {}",
                        planned.track,
                        planned.window,
                        planned.output.display()
                    );
                }
            } else {
                println!(
                    "  {} written, {} already present, {} failed",
                    report.segments_written(),
                    report.segments_skipped(),
                    report.failures.len()
                );
                for failure in &report.failures {
                    println!("  ! song {} '{}': {}", failure.index, failure.name, failure.message);
                }
            }
            for anomaly in &report.anomalies {
                println!("  ? {}", anomaly);
            }
        }
        RecordingOutcome::Skipped { reason } => println!("  skipped: {}", reason),
        RecordingOutcome::Failed(summary) => {
            println!("  FAILED ({:?}, songs {:?}): {}", summary.kind, summary.songs, summary.message)
        }
    }
}

fn write_report(path: &Path, results: &[BatchResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

fn run(cli: Cli) -> Result<bool> {
    let config = load_config(&cli)?;

    if cli.show_config {
        config.print("Effective settings");
        return Ok(true);
    }
    if cli.save_defaults {
        let path = match &cli.config {
            Some(path) => {
                config.save_to(path)?;
                path.clone()
            }
            None => config.save()?,
        };
        println!("Defaults saved to {}", path.display());
    }

    let Some(manifest_path) = cli.manifest.as_deref() else {
        if cli.save_defaults {
            return Ok(true);
        }
        anyhow::bail!("no manifest given");
    };

    let manifest = Manifest::load(manifest_path)?;
    let base_dir = manifest_path.parent().unwrap_or(Path::new("."));
    let jobs: Vec<BatchJob> = manifest
        .recordings
        .into_iter()
        .map(|r| {
            let (recording, songs) = r.into_parts(base_dir);
            BatchJob { recording, songs }
        })
        .collect();

    let options = SegmentOptions {
        window: config.window_config(),
        artist: config.artist.clone().unwrap_or_default(),
        output_root: config.output_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
        dry_run: cli.dry_run,
        write_cue: cli.cue,
    };

    let runner = make_runner(&config, options, &jobs)?;
    let results = runner.run(jobs);

    for result in &results {
        print_result(result, cli.dry_run);
    }

    let totals = BatchTotals::from_results(&results);
    println!();
    println!(
        "{} recording(s) done, {} skipped, {} failed; {} segment(s) written, {} already present, {} anomalies",
        totals.completed,
        totals.skipped,
        totals.failed,
        totals.segments_written,
        totals.segments_skipped,
        totals.anomalies
    );

    if let Some(path) = &cli.report {
        write_report(path, &results)?;
    }

    Ok(totals.is_success())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

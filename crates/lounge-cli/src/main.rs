//! Lounge CLI - The `lounge` command.
//!
//! Drives the generative melody engine from a terminal. Notes are rendered
//! through [`LogPlayback`], which logs every sample it would play, so the CLI
//! runs without an audio device.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lounge_core::{
    ComputeMode, Generator, GeneratorConfig, LogPlayback, MelodicState, NoteSelector,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lounge - generative melody over a looping backing track
#[derive(Parser, Debug)]
#[command(name = "lounge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generative melody layer for a looping backing track", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the generator and log every note it plays
    Run {
        /// Configuration file (defaults to the user config, if present)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Stop after this long (e.g. "30s", "2m"); runs until Ctrl-C if absent
        #[arg(short, long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Random seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Compute notes on a worker thread
        #[arg(long)]
        offload: bool,

        /// Instrument, or several separated by commas
        #[arg(short, long)]
        instrument: Option<String>,

        /// Transpose in semitones
        #[arg(short, long, allow_hyphen_values = true)]
        transpose: Option<i32>,

        /// Play a manual progression of N notes right after start
        #[arg(long, value_name = "N")]
        burst: Option<usize>,
    },

    /// Print a table of generated notes walking the backing loop
    Notes {
        /// Number of notes
        #[arg(short = 'n', long, default_value_t = 32)]
        count: usize,

        /// Random seed
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Milliseconds between notes
        #[arg(long, default_value_t = 300)]
        step_ms: u64,

        /// Transpose in semitones
        #[arg(short, long, default_value_t = -5, allow_hyphen_values = true)]
        transpose: i32,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match args.command {
        Commands::Run {
            config,
            duration,
            seed,
            offload,
            instrument,
            transpose,
            burst,
        } => {
            let mut config = match config {
                Some(path) => GeneratorConfig::load(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?,
                None => GeneratorConfig::load_or_default(),
            };
            if seed.is_some() {
                config.seed = seed;
            }
            if offload {
                config.compute_mode = ComputeMode::Offloaded;
            }
            if let Some(csv) = instrument {
                config
                    .set_instrument(&csv)
                    .with_context(|| format!("Invalid instrument '{}'", csv))?;
            }
            if let Some(semitones) = transpose {
                config
                    .set_transpose(semitones)
                    .context("Invalid transpose")?;
            }
            run(config, duration, burst)
        }
        Commands::Notes {
            count,
            seed,
            step_ms,
            transpose,
        } => print_notes(count, seed, step_ms, transpose),
        Commands::Version => {
            println!("lounge {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Generative melody layer for a looping backing track");
            println!("  - lounge-core: timeline, note selection, runtime");
            Ok(())
        }
    }
}

fn run(config: GeneratorConfig, duration: Option<Duration>, burst: Option<usize>) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())
        .context("Failed to register SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())
        .context("Failed to register SIGTERM handler")?;

    let generator = Generator::spawn(config, Box::new(LogPlayback::new()))
        .context("Failed to start generator")?;
    let handle = generator.handle().clone();

    handle.start().context("Failed to start playback")?;
    if let Some(count) = burst {
        handle
            .play_note_progression(count)
            .context("Failed to schedule progression")?;
    }

    match duration {
        Some(d) => log::info!("Playing for {}", humantime::format_duration(d)),
        None => log::info!("Playing until Ctrl-C"),
    }

    let started = Instant::now();
    while !shutdown.load(Ordering::Relaxed) {
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    log::info!("Shutting down");
    generator.shutdown();
    Ok(())
}

fn print_notes(count: usize, seed: u64, step_ms: u64, transpose: i32) -> Result<()> {
    let mut config = GeneratorConfig::default();
    config
        .set_transpose(transpose)
        .context("Invalid transpose")?;

    let selector = NoteSelector::default();
    let timeline = selector.timeline();
    let mut state = MelodicState::new(config.transpose);
    let mut rng = StdRng::seed_from_u64(seed);
    let t0 = Instant::now();

    println!(
        "{:>4}  {:>8}  {:>3}  {:<17}  {:>5}  {:<8}  {:>6}",
        "#", "position", "seg", "scale", "pitch", "sample", "rate"
    );
    for i in 0..count {
        let elapsed = Duration::from_millis(step_ms * i as u64);
        let position = elapsed.as_secs_f64() % timeline.loop_duration();
        let segment_index = timeline.locate(position);
        let note = selector.next_note(&mut state, segment_index, t0 + elapsed, &mut rng);
        println!(
            "{:>4}  {:>7.3}s  {:>3}  {:<17}  {:>5}  {:<8}  {:>6.4}",
            i,
            position,
            segment_index,
            timeline.segment(segment_index).scale.name(),
            note.pitch,
            note.sample_id,
            note.playback_rate
        );
    }
    Ok(())
}

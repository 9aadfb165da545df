//! Headless RTS kernel runner.
//!
//! Runs scenarios without any frontend, records them as replays, and
//! checks recorded replays for desyncs.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario, printing one line per tick
//! cargo run -p rts_runner -- run --scenario scenarios/skirmish.ron --ticks 600
//!
//! # Same, as JSON lines
//! cargo run -p rts_runner -- run --scenario scenarios/skirmish.ron --json
//!
//! # Record a replay, then verify it
//! cargo run -p rts_runner -- record --scenario scenarios/harvest.ron --out harvest.replay
//! cargo run -p rts_runner -- verify --replay harvest.replay
//! ```
//!
//! Reports go to stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rts_kernel::replay::{Replay, ReplayPlayer};
use rts_runner::{Result, Scenario, ScenarioRunner, TickReport};

#[derive(Parser)]
#[command(name = "rts_runner")]
#[command(about = "Headless runner and replay verifier for the RTS kernel")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and report each tick
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Ticks to run (defaults to the scenario's own)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Emit JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// Re-run a recorded replay and compare final hashes
    Verify {
        /// Replay file path
        #[arg(short, long)]
        replay: PathBuf,
    },

    /// Run a scenario and save a replay of it
    Record {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Replay output path
        #[arg(short, long)]
        out: PathBuf,

        /// Ticks to run (defaults to the scenario's own)
        #[arg(short, long)]
        ticks: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the flag when set.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let outcome = match cli.command {
        Commands::Run {
            scenario,
            ticks,
            json,
        } => cmd_run(&scenario, ticks, json),
        Commands::Verify { replay } => cmd_verify(&replay),
        Commands::Record {
            scenario,
            out,
            ticks,
        } => cmd_record(&scenario, &out, ticks),
    };

    if let Err(err) = outcome {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn print_report(report: &TickReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!(
            "tick {:>6}  hash {:016x}  entities {:>4}  +{} -{}",
            report.tick, report.state_hash, report.entities, report.spawned, report.destroyed
        );
    }
    Ok(())
}

/// Run a scenario
fn cmd_run(path: &Path, ticks: Option<u64>, json: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let ticks = ticks.unwrap_or(scenario.ticks);
    let mut runner = ScenarioRunner::new(scenario)?;

    let summary = runner.run(ticks, |report| print_report(report, json))?;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("--- {} (seed {}) ---", summary.scenario, summary.seed);
        println!("  Ticks:     {}", summary.ticks);
        println!("  Hash:      {:016x}", summary.final_hash);
        println!("  Destroyed: {}", summary.destroyed);
        println!(
            "  Orders:    {} applied, {} rejected",
            summary.orders_applied, summary.orders_rejected
        );
        for (house, count) in &summary.survivors {
            println!("  House {house}: {count} left");
        }
    }
    Ok(())
}

/// Verify a recorded replay
fn cmd_verify(path: &Path) -> Result<()> {
    let replay = Replay::load(path)?;

    eprintln!("Loaded replay:");
    eprintln!("  Scenario: {}", replay.scenario_id);
    eprintln!("  Seed: {}", replay.seed);
    eprintln!("  Orders: {}", replay.order_count());
    eprintln!("  Duration: {} ticks", replay.final_tick);

    let mut player = ReplayPlayer::new(replay)?;
    match player.verify() {
        Ok(()) => {
            eprintln!("PASS: Replay verification successful");
            eprintln!("  Hash: {:016x}", player.simulation().state_hash());
            Ok(())
        }
        Err(err) => {
            eprintln!("FAIL: {err}");
            eprintln!("  Expected hash: {:016x}", player.replay().final_hash);
            eprintln!("  Actual hash:   {:016x}", player.simulation().state_hash());
            Err(err.into())
        }
    }
}

/// Run a scenario and save the recording
fn cmd_record(path: &Path, out: &Path, ticks: Option<u64>) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let ticks = ticks.unwrap_or(scenario.ticks);
    let mut runner = ScenarioRunner::new(scenario)?;
    runner.record()?;
    let summary = runner.run(ticks, |_| Ok(()))?;

    if let Some(replay) = runner.finish_recording() {
        replay.save(out)?;
        eprintln!(
            "Recorded {} ticks, {} orders, final hash {:016x} -> {}",
            summary.ticks,
            replay.order_count(),
            summary.final_hash,
            out.display()
        );
    }
    Ok(())
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a corral level headlessly.
//!
//! Every requested animal is tapped once before the first tick. The event
//! log and the final slot inventory are printed to stdout.

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use corral_core::{Command, EntityId, Event};
use corral_simulation::{query, Simulation};
use tracing::info;
use tracing_subscriber::EnvFilter;

const BUNDLED_LEVEL: &str = include_str!("../levels/farm.toml");

/// Runs a corral level without a renderer.
#[derive(Debug, Parser)]
#[command(name = "corral", version)]
struct Args {
    /// Level file in TOML. The bundled demo farm is used when omitted.
    #[arg(long)]
    level: Option<PathBuf>,
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u32,
    /// Length of a tick in milliseconds.
    #[arg(long, default_value_t = 16)]
    dt_ms: u64,
    /// Entity ids to tap, in order. Every animal is tapped when omitted.
    #[arg(long = "tap", value_name = "ENTITY")]
    taps: Vec<u32>,
    /// Stop early once nothing moves anymore.
    #[arg(long)]
    until_settled: bool,
    /// Raises log verbosity; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Entry point for the corral command-line interface.
fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut simulation = load(args.level.as_ref())?;
    let taps: Vec<EntityId> = if args.taps.is_empty() {
        query::animals(&simulation)
    } else {
        args.taps.iter().copied().map(EntityId::new).collect()
    };

    let mut events = Vec::new();
    for animal in taps {
        simulation.apply(Command::Tap { animal }, &mut events);
    }

    let dt = Duration::from_millis(args.dt_ms);
    let mut ticks_run = 0;
    for _ in 0..args.ticks {
        simulation.apply(Command::Tick { dt }, &mut events);
        ticks_run += 1;
        if args.until_settled && query::is_settled(&simulation) {
            break;
        }
    }
    info!(ticks = ticks_run, events = events.len(), "run finished");

    for event in events.iter().filter(|event| !matches!(event, Event::TimeAdvanced { .. })) {
        println!("{event:?}");
    }
    let kinds: Vec<&str> = query::slot_kinds(&simulation)
        .into_iter()
        .map(|kind| kind.name())
        .collect();
    println!("slots: [{}]", kinds.join(", "));
    println!("animals left: {}", query::animals(&simulation).len());
    Ok(())
}

fn load(path: Option<&PathBuf>) -> Result<Simulation> {
    let Some(path) = path else {
        return Simulation::from_toml_str(BUNDLED_LEVEL).context("bundled level is invalid");
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read level at {}", path.display()))?;
    Simulation::from_toml_str(&contents)
        .with_context(|| format!("failed to load level at {}", path.display()))
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

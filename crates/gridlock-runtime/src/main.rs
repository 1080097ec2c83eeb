//! Gridlock binary.
//!
//! # Usage
//!
//! ```bash
//! # Banker's walkthrough over the textbook claims
//! gridlock --mode avoidance
//!
//! # Three-participant ring, halt on the first cycle
//! gridlock --mode detection
//!
//! # Five-participant ring, terminate victims until everyone else finishes
//! gridlock --mode resolution --ring 5 --trace-out trace.cbor
//! ```

use std::{io::Write, path::PathBuf, time::Duration};

use clap::Parser;
use gridlock_core::{Mode, ModeKind, Scenario, VictimPolicy};
use gridlock_runtime::{EngineConfig, SystemEnv, export_trace, run};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Deadlock avoidance, detection and resolution simulator
#[derive(Parser, Debug)]
#[command(name = "gridlock")]
#[command(about = "Deadlock avoidance, detection and resolution simulator")]
#[command(version)]
struct Args {
    /// Mode to run (avoidance, detection, resolution)
    #[arg(short, long, default_value = "detection")]
    mode: ModeKind,

    /// Participants in the hold-and-wait ring, 2 to 64 (detection and resolution)
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u16).range(2..=64))]
    ring: u16,

    /// Monitor polling interval in milliseconds
    #[arg(long, default_value = "200")]
    poll_interval_ms: u64,

    /// Pause after each scripted step in milliseconds
    #[arg(long, default_value = "150")]
    think_time_ms: u64,

    /// Maximum random extra think time in milliseconds
    #[arg(long, default_value = "0")]
    think_jitter_ms: u64,

    /// Blocked participants re-check for a stop this often, in milliseconds
    #[arg(long, default_value = "50")]
    recheck_interval_ms: u64,

    /// Halt the run after this many milliseconds
    #[arg(long, default_value = "10000")]
    deadline_ms: u64,

    /// Victim selection policy (highest-pid, smallest-footprint)
    #[arg(long, default_value = "highest-pid")]
    victim_policy: VictimPolicy,

    /// Write the trace as CBOR to this file
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mode = match args.mode {
        ModeKind::Avoidance => Mode::builtin(ModeKind::Avoidance),
        ModeKind::Detection => Mode::Detection(Scenario::ring(usize::from(args.ring))?),
        ModeKind::Resolution => Mode::Resolution(Scenario::ring(usize::from(args.ring))?),
    };

    let config = EngineConfig {
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        think_time: Duration::from_millis(args.think_time_ms),
        think_jitter: Duration::from_millis(args.think_jitter_ms),
        recheck_interval: Duration::from_millis(args.recheck_interval_ms),
        deadline: Duration::from_millis(args.deadline_ms),
        victim_policy: args.victim_policy,
    };

    tracing::info!("running {} mode", args.mode);
    let trace = run(&mode, SystemEnv::new(), &config).await?;

    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{trace}")?;
    stdout.flush()?;

    if let Some(path) = &args.trace_out {
        export_trace(&trace, path)?;
    }

    Ok(())
}

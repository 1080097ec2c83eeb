//! Gridlock runtime.
//!
//! Drives the Sans-IO core with real concurrency:
//! - One Tokio task per participant plus one monitor task
//! - Ledger and trace behind a single `tokio::sync::Mutex`
//! - Time and randomness through an [`Environment`]
//!
//! ## Architecture
//!
//! ```text
//! gridlock-runtime
//!   ├─ SystemEnv      (real-time Environment impl)
//!   ├─ Arbiter        (Ledger + Trace under one lock, executes LedgerActions)
//!   ├─ participant    (scripted request/release task)
//!   ├─ monitor        (wait-for graph, halt or victim termination)
//!   └─ export         (CBOR trace files)
//! ```
//!
//! The same drivers run under turmoil in `gridlock-harness` with a simulated
//! clock, which is why nothing here reads the system clock directly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod arbiter;
mod config;
mod error;
mod export;
mod monitor;
mod participant;
mod system_env;

pub use arbiter::Arbiter;
pub use config::EngineConfig;
pub use error::RunError;
pub use export::{export_trace, write_trace_cbor};
use gridlock_core::{Ledger, Mode, Pid, Scenario, Trace, env::Environment};
use monitor::Recovery;
pub use system_env::SystemEnv;
use tokio::task::JoinSet;

/// Run `mode` to completion.
pub async fn run<E: Environment>(
    mode: &Mode,
    env: E,
    config: &EngineConfig,
) -> Result<Trace, RunError> {
    match mode {
        Mode::Avoidance(scenario) => Ok(scenario.run()?),
        Mode::Detection(scenario) => run_detection(scenario, env, config).await,
        Mode::Resolution(scenario) => run_resolution(scenario, env, config).await,
    }
}

/// Greedy run that halts every participant on the first cycle.
pub async fn run_detection<E: Environment>(
    scenario: &Scenario,
    env: E,
    config: &EngineConfig,
) -> Result<Trace, RunError> {
    run_concurrent(scenario, env, config, Recovery::Halt).await
}

/// Greedy run that terminates victims until no cycle remains.
pub async fn run_resolution<E: Environment>(
    scenario: &Scenario,
    env: E,
    config: &EngineConfig,
) -> Result<Trace, RunError> {
    run_concurrent(scenario, env, config, Recovery::Terminate).await
}

async fn run_concurrent<E: Environment>(
    scenario: &Scenario,
    env: E,
    config: &EngineConfig,
    recovery: Recovery,
) -> Result<Trace, RunError> {
    scenario.validate()?;
    tracing::info!(
        "starting {:?} run: {} participants over {}",
        recovery,
        scenario.participants(),
        scenario.total_units
    );

    let ledger = Ledger::greedy(scenario.total_units.clone(), scenario.participants());
    let arbiter = Arbiter::new(env, ledger);

    let monitor = {
        let arbiter = arbiter.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let result = monitor::run(arbiter.clone(), recovery, config).await;
            if let Err(err) = &result {
                tracing::error!("monitor failed: {}", err);
                if let Err(halt_err) = arbiter.halt().await {
                    tracing::error!("halt after monitor failure failed: {}", halt_err);
                }
            }
            result
        })
    };

    let mut participants = JoinSet::new();
    for (idx, script) in scenario.scripts.iter().enumerate() {
        participants.spawn(participant::run(
            arbiter.clone(),
            Pid(idx),
            script.clone(),
            config.clone(),
        ));
    }

    let mut failure: Option<RunError> = None;
    while let Some(joined) = participants.join_next().await {
        let err = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => RunError::from(err),
            Err(err) => RunError::from(err),
        };
        tracing::error!("participant failed: {}", err);
        if failure.is_none() {
            // Release everyone else so the run can wind down.
            if let Err(halt_err) = arbiter.halt().await {
                tracing::error!("halt after failure failed: {}", halt_err);
            }
            failure = Some(err);
        }
    }

    arbiter.wake_monitor();
    let monitored = monitor.await;
    if let Some(err) = failure {
        return Err(err);
    }
    monitored??;

    Ok(arbiter.finish_run().await?)
}

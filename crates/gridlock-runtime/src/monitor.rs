//! Monitor task: periodic deadlock detection and recovery.
//!
//! Each observation copies the ledger out under the lock, builds the
//! wait-for graph on the copy and looks for a cycle. The lock is never held
//! while the graph is searched.

use gridlock_core::{TraceEvent, WaitForGraph, env::Environment};

use crate::{arbiter::Arbiter, config::EngineConfig};

/// What the monitor does with a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// Raise the stop signal and exit.
    Halt,
    /// Terminate a victim and keep watching.
    Terminate,
}

/// Watch until every participant has terminated, the stop signal is up, or
/// the deadline passes.
pub(crate) async fn run<E: Environment>(
    arbiter: Arbiter<E>,
    recovery: Recovery,
    config: EngineConfig,
) -> Result<(), gridlock_core::EngineError> {
    let env = arbiter.env().clone();
    let deadline = env.now().checked_add(config.deadline);

    loop {
        // Poll order is fixed so seeded runs replay identically.
        tokio::select! {
            biased;
            () = arbiter.blocking_event() => {},
            () = env.sleep(config.poll_interval) => {},
        }

        let snapshot = arbiter.snapshot().await;
        if snapshot.all_terminated() {
            tracing::debug!("all participants terminated, monitor exiting");
            return Ok(());
        }
        if arbiter.is_stopped().await {
            return Ok(());
        }
        if deadline.is_some_and(|deadline| env.now() >= deadline) {
            tracing::warn!("run deadline of {:?} exceeded, halting", config.deadline);
            arbiter.record(TraceEvent::DeadlineExceeded).await;
            arbiter.halt().await?;
            return Ok(());
        }

        let graph = WaitForGraph::build(&snapshot);
        let Some(cycle) = graph.find_cycle() else {
            continue;
        };
        tracing::info!("deadlock detected: {}", cycle);
        arbiter.record(TraceEvent::DeadlockDetected { cycle: cycle.clone() }).await;

        match recovery {
            Recovery::Halt => {
                arbiter.halt().await?;
                return Ok(());
            },
            Recovery::Terminate => {
                let Some(victim) = config.victim_policy.select(&cycle, &snapshot) else {
                    continue;
                };
                match arbiter.terminate_victim(victim, config.victim_policy).await {
                    Ok(true) => {
                        tracing::info!("terminated {} ({})", victim, config.victim_policy);
                    },
                    // Cycle dissolved since the snapshot; look again.
                    Ok(false) => tracing::debug!("victim {} no longer deadlocked", victim),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => tracing::debug!("victim {} already gone: {}", victim, err),
                }
            },
        }
    }
}

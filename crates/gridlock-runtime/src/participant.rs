//! Participant task: runs one script against the arbiter.

use gridlock_core::{
    Checkpoint, EngineError, ParticipantScript, Pid, RequestOutcome, Step, env::Environment,
};

use crate::{arbiter::Arbiter, config::EngineConfig};

/// Run `script` for `pid` until it completes or is halted or terminated.
///
/// Refused requests and releases are already in the trace; the script moves
/// on to its next step. Only fatal errors are returned.
pub(crate) async fn run<E: Environment>(
    arbiter: Arbiter<E>,
    pid: Pid,
    script: ParticipantScript,
    config: EngineConfig,
) -> Result<(), EngineError> {
    for (step, action) in script.steps.iter().enumerate() {
        if let Checkpoint::Stop(termination) = arbiter.checkpoint(pid).await? {
            tracing::debug!("{} stops before step {}: {}", pid, step, termination);
            return Ok(());
        }

        match action {
            Step::Request(request) => match arbiter.request(pid, step, request).await {
                Ok(RequestOutcome::Granted) => {},
                Ok(RequestOutcome::Blocked) => {
                    let waited = arbiter.wait_until_unblocked(pid, config.recheck_interval).await?;
                    if let Some(termination) = waited {
                        tracing::debug!("{} left while blocked: {}", pid, termination);
                        return Ok(());
                    }
                },
                Ok(RequestOutcome::Halted) => return Ok(()),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => tracing::warn!("{} step {} refused: {}", pid, step, err),
            },
            Step::Release(units) => match arbiter.release(pid, units).await {
                Ok(()) => {},
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => tracing::warn!("{} step {} refused: {}", pid, step, err),
            },
            Step::Exit => break,
        }

        let env = arbiter.env();
        env.sleep(config.think_time + env.jitter(config.think_jitter)).await;
    }

    if let Checkpoint::Stop(termination) = arbiter.checkpoint(pid).await? {
        tracing::debug!("{} stops before exit: {}", pid, termination);
        return Ok(());
    }
    match arbiter.finish(pid).await {
        Err(err) if err.is_fatal() => Err(err),
        _ => Ok(()),
    }
}

//! Banker's algorithm.
//!
//! A state is *safe* when some order exists in which every participant can
//! obtain its remaining claim, finish and hand everything back. The scan below
//! looks for that order greedily, in ascending pid order, restarting passes
//! until no participant can advance. Ascending order is the tie-break: for a
//! fixed matrix the reported sequence is always the same.

use serde::Serialize;

use crate::{
    error::EngineError,
    state::ResourceState,
    types::{Pid, ResourceVector},
};

/// Outcome of a request evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Request committed; the state stays safe via `safe_sequence`.
    Grant {
        /// Completion order proving the new state safe.
        safe_sequence: Vec<Pid>,
    },
    /// Request rolled back; granting it would leave no safe sequence.
    Deny,
}

/// Completion order for `state`, or `None` if the state is unsafe.
///
/// Participants without declared claims are treated as needing nothing.
pub fn safe_sequence(state: &ResourceState) -> Option<Vec<Pid>> {
    let participants = state.participants();
    let mut work = state.available().clone();
    let mut finish = vec![false; participants];
    let mut sequence = Vec::with_capacity(participants);

    loop {
        let mut progressed = false;
        for idx in 0..participants {
            if finish[idx] {
                continue;
            }
            let pid = Pid(idx);
            let need = state.need(pid).unwrap_or_else(|| ResourceVector::zeros(work.len()));
            if !need.fits_within(&work) {
                continue;
            }
            let Some(held) = state.allocation(pid) else { continue };
            // Units in `work` plus units handed back can never exceed the
            // totals, so overflow here would mean conservation is broken.
            let Some(next) = work.checked_add(held) else { return None };
            work = next;
            finish[idx] = true;
            sequence.push(pid);
            progressed = true;
        }
        if !progressed {
            break;
        }
    }

    finish.iter().all(|done| *done).then_some(sequence)
}

/// True when a safe sequence exists.
pub fn is_safe(state: &ResourceState) -> bool {
    safe_sequence(state).is_some()
}

/// Tentatively grant `request` and keep it only if the result is safe.
///
/// # Errors
///
/// Returns `EngineError::MalformedRequest` without scanning if the request
/// exceeds the participant's need or what is available. The state is left
/// untouched in that case and on `Decision::Deny`.
pub fn evaluate_request(
    state: &mut ResourceState,
    pid: Pid,
    request: &ResourceVector,
) -> Result<Decision, EngineError> {
    let before = state.clone();
    state.grant(pid, request)?;

    match safe_sequence(state) {
        Some(safe_sequence) => {
            tracing::debug!("{} granted {} (safe sequence {:?})", pid, request, safe_sequence);
            Ok(Decision::Grant { safe_sequence })
        },
        None => {
            tracing::debug!("{} denied {}: state would be unsafe", pid, request);
            *state = before;
            Ok(Decision::Deny)
        },
    }
}

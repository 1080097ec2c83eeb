//! Avoidance walkthrough.
//!
//! Synchronous: every scripted request goes through the Banker's check on an
//! avoiding [`Ledger`] and is recorded with its verdict and the safe sequence
//! at the point of decision. Unsafe and malformed requests are refused and
//! the script carries on; nothing ever blocks.

use crate::{
    banker,
    error::EngineError,
    ledger::{Ledger, LedgerAction},
    scenario::{AvoidanceScenario, AvoidanceStep},
    state::ResourceState,
    trace::{Trace, TraceEvent, Verdict},
    types::{Pid, ResourceVector},
};

/// Run `steps` against the given claims and initial allocation.
///
/// # Errors
///
/// Returns `EngineError::InvalidScenario` for inconsistent matrices and
/// `EngineError::InvariantViolation` if the ledger breaks. Refused requests
/// are recorded in the trace, not returned.
pub fn run_avoidance(
    max_claim: Vec<ResourceVector>,
    initial_allocation: Vec<ResourceVector>,
    total_units: ResourceVector,
    steps: &[AvoidanceStep],
) -> Result<Trace, EngineError> {
    let state = ResourceState::with_claims(total_units, max_claim, initial_allocation)?;
    let mut ledger = Ledger::avoiding(state)?;
    let mut trace = Trace::new();

    let initial = banker::safe_sequence(ledger.resources());
    if initial.is_none() {
        tracing::warn!("initial avoidance state is already unsafe");
    }
    trace.push(TraceEvent::SafeState { safe_sequence: initial });

    for step in steps {
        match step {
            AvoidanceStep::Request { pid, request } => {
                let verdict = evaluate(&mut ledger, *pid, request)?;
                tracing::info!("{} requests {}: {:?}", pid, request, verdict);
                trace.push(TraceEvent::Evaluated { pid: *pid, request: request.clone(), verdict });
            },
            AvoidanceStep::Release { pid, units } => match ledger.release(*pid, units) {
                Ok(actions) => {
                    for action in actions {
                        if let LedgerAction::Record(event) = action {
                            trace.push(event);
                        }
                    }
                },
                Err(err) => match err.malformed_reason() {
                    Some(reason) => trace.push(TraceEvent::ReleaseRejected { pid: *pid, reason }),
                    None => return Err(err),
                },
            },
        }
    }

    Ok(trace)
}

/// The verdict supersedes the ledger's own grant record.
fn evaluate(
    ledger: &mut Ledger,
    pid: Pid,
    request: &ResourceVector,
) -> Result<Verdict, EngineError> {
    match ledger.request(pid, request) {
        Ok(_) => match banker::safe_sequence(ledger.resources()) {
            Some(safe_sequence) => Ok(Verdict::Granted { safe_sequence }),
            None => Err(EngineError::InvariantViolation {
                detail: format!("granting {request} to {pid} left an unsafe state"),
                dump: format!("{ledger:#?}"),
            }),
        },
        Err(EngineError::UnsafeRequest { .. }) => {
            Ok(Verdict::Denied { safe_sequence: banker::safe_sequence(ledger.resources()) })
        },
        Err(err) => match err.malformed_reason() {
            Some(reason) => Ok(Verdict::Rejected { reason }),
            None => Err(err),
        },
    }
}

impl AvoidanceScenario {
    /// Run this scenario through [`run_avoidance`].
    ///
    /// # Errors
    ///
    /// See [`run_avoidance`].
    pub fn run(&self) -> Result<Trace, EngineError> {
        run_avoidance(
            self.max_claim.clone(),
            self.allocation.clone(),
            self.total_units.clone(),
            &self.steps,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MalformedReason;

    #[test]
    fn malformed_request_is_rejected_and_script_continues() {
        let mut scenario = AvoidanceScenario::textbook();
        scenario.steps.insert(0, AvoidanceStep::Request { pid: Pid(2), request: [0, 1, 0].into() });

        let trace = scenario.run().unwrap();
        let verdicts: Vec<_> = trace.verdicts().collect();
        assert_eq!(verdicts.len(), 4);
        assert!(matches!(verdicts[0].1, Verdict::Rejected {
            reason: MalformedReason::ExceedsClaim { .. }
        }));
        assert!(matches!(verdicts[2].1, Verdict::Granted { .. }));
    }

    #[test]
    fn release_beyond_holding_is_recorded() {
        let mut scenario = AvoidanceScenario::textbook();
        scenario.steps = vec![AvoidanceStep::Release { pid: Pid(4), units: [1, 0, 0].into() }];

        let trace = scenario.run().unwrap();
        assert!(matches!(trace.events().last(), Some(TraceEvent::ReleaseRejected { .. })));
    }

    #[test]
    fn inconsistent_matrices_are_invalid() {
        let result = run_avoidance(vec![[1].into()], vec![[2].into()], [2].into(), &[]);
        assert!(matches!(result, Err(EngineError::InvalidScenario(_))));
    }
}

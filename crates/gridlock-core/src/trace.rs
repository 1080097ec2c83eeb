//! Run trace: the externally observed output of every mode.

use std::{fmt, time::Duration};

use serde::Serialize;

use crate::{
    error::MalformedReason,
    ledger::ParticipantState,
    types::{Pid, PidList, ResourceId, ResourceVector},
    victim::VictimPolicy,
    wait_for::Cycle,
};

/// Avoidance verdict on one scripted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Granted; the new state is safe.
    Granted {
        /// Safe sequence of the state after the grant.
        safe_sequence: Vec<Pid>,
    },
    /// Denied as unsafe; nothing changed.
    Denied {
        /// Safe sequence of the unchanged state.
        safe_sequence: Option<Vec<Pid>>,
    },
    /// Refused as malformed without a safety scan.
    Rejected {
        /// What was wrong with the request.
        reason: MalformedReason,
    },
}

/// One observable step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TraceEvent {
    /// Safety of the avoidance state before the script runs.
    SafeState {
        /// Safe sequence, `None` if the state is unsafe.
        safe_sequence: Option<Vec<Pid>>,
    },
    /// Avoidance decision on a scripted request.
    Evaluated {
        /// Requesting participant.
        pid: Pid,
        /// Requested units.
        request: ResourceVector,
        /// Decision.
        verdict: Verdict,
    },
    /// A scripted release refused as malformed.
    ReleaseRejected {
        /// Releasing participant.
        pid: Pid,
        /// What was wrong with it.
        reason: MalformedReason,
    },
    /// A participant issued a request.
    Requested {
        /// Requesting participant.
        pid: Pid,
        /// Index of the step in the participant's script.
        step: usize,
        /// Requested units.
        request: ResourceVector,
    },
    /// Units moved into a participant's allocation.
    Granted {
        /// Receiving participant.
        pid: Pid,
        /// Granted units.
        request: ResourceVector,
        /// Granted after having been blocked.
        waited: bool,
    },
    /// A request could not be satisfied and the participant blocked.
    Blocked {
        /// Blocked participant.
        pid: Pid,
        /// Pending request.
        request: ResourceVector,
        /// Resources it is short of.
        waiting_on: Vec<ResourceId>,
    },
    /// A request or release refused as malformed during a concurrent run.
    Refused {
        /// Offending participant.
        pid: Pid,
        /// What was wrong with it.
        reason: MalformedReason,
    },
    /// Units handed back by their holder.
    Released {
        /// Releasing participant.
        pid: Pid,
        /// Released units.
        units: ResourceVector,
    },
    /// The monitor found a circular wait.
    DeadlockDetected {
        /// The cycle.
        cycle: Cycle,
    },
    /// Global stop signal raised.
    Halted,
    /// A participant left the run because of the stop signal.
    Aborted {
        /// Halted participant.
        pid: Pid,
        /// Units it held.
        released: ResourceVector,
    },
    /// A deadlock victim was chosen.
    VictimSelected {
        /// Victim.
        pid: Pid,
        /// Policy that chose it.
        policy: VictimPolicy,
    },
    /// A victim's allocation was returned to the pool.
    Reclaimed {
        /// Victim.
        pid: Pid,
        /// Reclaimed units.
        units: ResourceVector,
    },
    /// A participant ran its whole script.
    Completed {
        /// Finished participant.
        pid: Pid,
        /// Units still held at exit.
        released: ResourceVector,
    },
    /// The run deadline passed before the run settled.
    DeadlineExceeded,
    /// Final status of every participant.
    Finished {
        /// `(pid, state)` for every participant.
        statuses: Vec<(Pid, ParticipantState)>,
    },
}

fn write_sequence(f: &mut fmt::Formatter<'_>, sequence: Option<&[Pid]>) -> fmt::Result {
    match sequence {
        Some(sequence) => write!(f, "safe sequence {}", PidList(sequence)),
        None => write!(f, "no safe sequence"),
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SafeState { safe_sequence } => {
                write!(f, "initial state: ")?;
                write_sequence(f, safe_sequence.as_deref())
            },
            Self::Evaluated { pid, request, verdict } => match verdict {
                Verdict::Granted { safe_sequence } => {
                    write!(f, "{pid} requests {request}: GRANTED, ")?;
                    write_sequence(f, Some(safe_sequence))
                },
                Verdict::Denied { safe_sequence } => {
                    write!(f, "{pid} requests {request}: DENIED (unsafe), ")?;
                    write_sequence(f, safe_sequence.as_deref())
                },
                Verdict::Rejected { reason } => {
                    write!(f, "{pid} requests {request}: REJECTED ({reason})")
                },
            },
            Self::ReleaseRejected { pid, reason } => {
                write!(f, "{pid} release rejected: {reason}")
            },
            Self::Requested { pid, step, request } => {
                write!(f, "{pid} requests {request} (step {step})")
            },
            Self::Granted { pid, request, waited } => {
                if *waited {
                    write!(f, "{pid} unblocked, granted {request}")
                } else {
                    write!(f, "{pid} granted {request}")
                }
            },
            Self::Blocked { pid, request, waiting_on } => {
                write!(f, "{pid} blocked on {request}, waiting for")?;
                for resource in waiting_on {
                    write!(f, " {resource}")?;
                }
                Ok(())
            },
            Self::Refused { pid, reason } => write!(f, "{pid} refused: {reason}"),
            Self::Released { pid, units } => write!(f, "{pid} released {units}"),
            Self::DeadlockDetected { cycle } => write!(f, "DEADLOCK detected: {cycle}"),
            Self::Halted => write!(f, "stop signal raised, halting all participants"),
            Self::Aborted { pid, released } => {
                write!(f, "{pid} halted, released {released}")
            },
            Self::VictimSelected { pid, policy } => {
                write!(f, "victim selected: {pid} ({policy})")
            },
            Self::Reclaimed { pid, units } => write!(f, "{pid} terminated, reclaimed {units}"),
            Self::Completed { pid, released } => {
                write!(f, "{pid} completed, released {released}")
            },
            Self::DeadlineExceeded => write!(f, "run deadline exceeded"),
            Self::Finished { statuses } => {
                write!(f, "final status:")?;
                for (pid, state) in statuses {
                    write!(f, " {pid}={state}")?;
                }
                Ok(())
            },
        }
    }
}

/// Trace event with its offset from the start of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    /// Time since the run started; `None` for the synchronous walkthrough.
    pub elapsed: Option<Duration>,
    /// What happened.
    pub event: TraceEvent,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(elapsed) = self.elapsed {
            write!(f, "+{}ms ", elapsed.as_millis())?;
        }
        write!(f, "{}", self.event)
    }
}

/// Ordered record of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    /// Empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an untimed event.
    pub fn push(&mut self, event: TraceEvent) {
        self.entries.push(TraceEntry { elapsed: None, event });
    }

    /// Append an event observed `elapsed` after the start of the run.
    pub fn push_at(&mut self, elapsed: Duration, event: TraceEvent) {
        self.entries.push(TraceEntry { elapsed: Some(elapsed), event });
    }

    /// All entries in order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// All events in order.
    pub fn events(&self) -> impl Iterator<Item = &TraceEvent> {
        self.entries.iter().map(|entry| &entry.event)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cycles reported by the monitor, in order.
    pub fn cycles(&self) -> impl Iterator<Item = &Cycle> {
        self.events().filter_map(|event| match event {
            TraceEvent::DeadlockDetected { cycle } => Some(cycle),
            _ => None,
        })
    }

    /// Victims chosen by the monitor, in order.
    pub fn victims(&self) -> Vec<Pid> {
        self.events()
            .filter_map(|event| match event {
                TraceEvent::VictimSelected { pid, .. } => Some(*pid),
                _ => None,
            })
            .collect()
    }

    /// Avoidance verdicts, in script order.
    pub fn verdicts(&self) -> impl Iterator<Item = (Pid, &Verdict)> {
        self.events().filter_map(|event| match event {
            TraceEvent::Evaluated { pid, verdict, .. } => Some((*pid, verdict)),
            _ => None,
        })
    }

    /// Final participant statuses, if the run recorded them.
    pub fn final_statuses(&self) -> Option<&[(Pid, ParticipantState)]> {
        self.entries.iter().rev().find_map(|entry| match &entry.event {
            TraceEvent::Finished { statuses } => Some(statuses.as_slice()),
            _ => None,
        })
    }

    /// Whether the stop signal was raised.
    pub fn halted(&self) -> bool {
        self.events().any(|event| matches!(event, TraceEvent::Halted))
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Termination;

    #[test]
    fn timed_entries_carry_offset() {
        let mut trace = Trace::new();
        trace.push_at(Duration::from_millis(150), TraceEvent::Granted {
            pid: Pid(1),
            request: [0, 1, 0].into(),
            waited: false,
        });
        assert_eq!(trace.to_string(), "+150ms P1 granted [0, 1, 0]\n");
    }

    #[test]
    fn final_statuses_display() {
        let event = TraceEvent::Finished {
            statuses: vec![
                (Pid(0), ParticipantState::Terminated(Termination::Completed)),
                (Pid(1), ParticipantState::Terminated(Termination::Victim)),
            ],
        };
        assert_eq!(event.to_string(), "final status: P0=completed P1=terminated (victim)");
    }

    #[test]
    fn blocked_lists_scarce_resources() {
        let event = TraceEvent::Blocked {
            pid: Pid(2),
            request: [1, 0, 1].into(),
            waiting_on: vec![ResourceId(0), ResourceId(2)],
        };
        assert_eq!(event.to_string(), "P2 blocked on [1, 0, 1], waiting for R0 R2");
    }

    #[test]
    fn accessors_filter_events() {
        let mut trace = Trace::new();
        trace.push(TraceEvent::VictimSelected { pid: Pid(2), policy: VictimPolicy::HighestPid });
        trace.push(TraceEvent::Halted);
        assert_eq!(trace.victims(), vec![Pid(2)]);
        assert!(trace.halted());
        assert_eq!(trace.cycles().count(), 0);
        assert_eq!(trace.final_statuses(), None);
    }
}

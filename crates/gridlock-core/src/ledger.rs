//! Request Arbiter
//!
//! Mediates every request, release and termination against the shared
//! [`ResourceState`].
//!
//! ## Responsibilities
//!
//! - Arbitration: Banker's check (avoidance) or greedy grant-or-block
//! - Blocking: FIFO queue of blocked requests, drained on every release
//! - Recovery: victim termination and the cooperative stop signal
//! - Action Generation: Return actions for the driver to execute (action-based)
//!
//! ## Design
//!
//! - Sans-IO: no locks, no clocks, no tasks. The driver owns the `Ledger`
//!   behind a single mutex and executes the returned [`LedgerAction`]s.
//! - Queued requests are granted on behalf of the waiter while the releasing
//!   call still holds the ledger, so FIFO order is decided in one place.
//! - Refused operations leave the ledger untouched.

use std::collections::VecDeque;

use serde::Serialize;

use crate::{
    banker::{self, Decision},
    error::{EngineError, MalformedReason},
    state::ResourceState,
    trace::TraceEvent,
    types::{Pid, ResourceVector},
    wait_for::WaitForGraph,
};

/// How requests are arbitrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arbitration {
    /// Banker's check before every grant; refusals never block.
    Avoidance,
    /// Grant when available, otherwise block.
    #[default]
    Greedy,
}

/// Why a participant terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// Ran its whole script.
    Completed,
    /// Stopped by the global stop signal.
    Halted,
    /// Chosen as deadlock victim.
    Victim,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Halted => write!(f, "halted"),
            Self::Victim => write!(f, "terminated (victim)"),
        }
    }
}

/// Participant lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParticipantState {
    /// Has not issued a request yet.
    Ready,
    /// Request under evaluation.
    Requesting,
    /// Waiting for units to be released.
    Blocked,
    /// Holding its grants and progressing.
    Running,
    /// No longer participating.
    Terminated(Termination),
}

impl ParticipantState {
    /// True once the participant has left the run.
    pub fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

impl std::fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Requesting => write!(f, "requesting"),
            Self::Blocked => write!(f, "blocked"),
            Self::Running => write!(f, "running"),
            Self::Terminated(termination) => write!(f, "{termination}"),
        }
    }
}

/// A request that could not be satisfied when issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedRequest {
    /// Waiting participant.
    pub pid: Pid,
    /// Full request it is waiting to have granted.
    pub request: ResourceVector,
}

/// Immediate result of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Units moved into the participant's allocation.
    Granted,
    /// Participant must wait for a [`LedgerAction::Wake`].
    Blocked,
    /// Stop signal is raised; the participant was halted instead.
    Halted,
}

/// Result of a cooperative checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Carry on with the script.
    Continue,
    /// Exit now.
    Stop(Termination),
}

/// Actions returned by the ledger for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerAction {
    /// Append this event to the run trace.
    Record(TraceEvent),
    /// Wake this participant; its state changed while it was suspended.
    Wake(Pid),
}

/// Consistent copy of everything cycle detection needs.
///
/// Taken while the driver holds the ledger; inspected after it lets go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Units per resource type.
    pub total: ResourceVector,
    /// Units currently free.
    pub available: ResourceVector,
    /// Units held, one row per participant.
    pub allocation: Vec<ResourceVector>,
    /// Participant states, indexed by pid.
    pub states: Vec<ParticipantState>,
    /// Blocked requests in the order they blocked.
    pub blocked: Vec<BlockedRequest>,
}

impl LedgerSnapshot {
    /// State of one participant.
    pub fn state(&self, pid: Pid) -> Option<ParticipantState> {
        self.states.get(pid.index()).copied()
    }

    /// Units held by one participant.
    pub fn allocation(&self, pid: Pid) -> Option<&ResourceVector> {
        self.allocation.get(pid.index())
    }

    /// True once every participant has terminated.
    pub fn all_terminated(&self) -> bool {
        self.states.iter().all(|state| state.is_terminated())
    }
}

/// Arbiter state: resources, participants, blocked queue and stop signal.
#[derive(Debug, Clone)]
pub struct Ledger {
    arbitration: Arbitration,
    state: ResourceState,
    participants: Vec<ParticipantState>,
    /// Blocked requests, oldest first.
    queue: VecDeque<BlockedRequest>,
    /// Global stop signal (detection mode).
    stopped: bool,
}

impl Ledger {
    /// Greedy ledger with every unit available.
    pub fn greedy(total: ResourceVector, participants: usize) -> Self {
        Self {
            arbitration: Arbitration::Greedy,
            state: ResourceState::new(total, participants),
            participants: vec![ParticipantState::Ready; participants],
            queue: VecDeque::new(),
            stopped: false,
        }
    }

    /// Avoidance ledger over a state with declared claims.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidScenario` if `state` has no claims, or
    /// `EngineError::InvariantViolation` if it is inconsistent.
    pub fn avoiding(state: ResourceState) -> Result<Self, EngineError> {
        if !state.has_claims() {
            return Err(EngineError::InvalidScenario(
                "avoidance needs declared maximum claims".into(),
            ));
        }
        state.check_invariants()?;

        let participants = vec![ParticipantState::Ready; state.participants()];
        Ok(Self {
            arbitration: Arbitration::Avoidance,
            state,
            participants,
            queue: VecDeque::new(),
            stopped: false,
        })
    }

    /// Arbitration discipline.
    pub fn arbitration(&self) -> Arbitration {
        self.arbitration
    }

    /// Underlying resource state.
    pub fn resources(&self) -> &ResourceState {
        &self.state
    }

    /// State of one participant.
    pub fn state(&self, pid: Pid) -> Option<ParticipantState> {
        self.participants.get(pid.index()).copied()
    }

    /// All participant states, indexed by pid.
    pub fn participants(&self) -> &[ParticipantState] {
        &self.participants
    }

    /// Blocked requests, oldest first.
    pub fn blocked(&self) -> impl Iterator<Item = &BlockedRequest> {
        self.queue.iter()
    }

    /// Whether the stop signal has been raised.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// True once every participant has terminated.
    pub fn all_terminated(&self) -> bool {
        self.participants.iter().all(|state| state.is_terminated())
    }

    /// Copy out what cycle detection needs.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            total: self.state.total().clone(),
            available: self.state.available().clone(),
            allocation: self.state.allocations().to_vec(),
            states: self.participants.clone(),
            blocked: self.queue.iter().cloned().collect(),
        }
    }

    /// Issue a request.
    ///
    /// # Errors
    ///
    /// - `MalformedRequest`: unknown or terminated participant, wrong length,
    ///   beyond capacity or claim (and beyond availability in avoidance)
    /// - `UnsafeRequest`: avoidance only, granting would be unsafe
    /// - `InvariantViolation`: request issued while blocked, or corrupt state
    ///
    /// The ledger is unchanged after a recoverable error.
    pub fn request(
        &mut self,
        pid: Pid,
        request: &ResourceVector,
    ) -> Result<(RequestOutcome, Vec<LedgerAction>), EngineError> {
        let current = self.live(pid)?;
        if current == ParticipantState::Blocked {
            return Err(self.violation(format!("{pid} issued a request while blocked")));
        }

        if self.stopped {
            let actions = self.halt_participant(pid)?;
            return Ok((RequestOutcome::Halted, actions));
        }

        self.participants[pid.index()] = ParticipantState::Requesting;
        let result = match self.arbitration {
            Arbitration::Avoidance => self.request_avoiding(pid, request),
            Arbitration::Greedy => self.request_greedy(pid, request),
        };
        if let Err(err) = &result {
            tracing::warn!("{} request {} refused: {}", pid, request, err);
            self.participants[pid.index()] = current;
        }

        self.check_invariants()?;
        result
    }

    fn request_avoiding(
        &mut self,
        pid: Pid,
        request: &ResourceVector,
    ) -> Result<(RequestOutcome, Vec<LedgerAction>), EngineError> {
        match banker::evaluate_request(&mut self.state, pid, request)? {
            Decision::Grant { .. } => {
                self.participants[pid.index()] = ParticipantState::Running;
                let event = TraceEvent::Granted { pid, request: request.clone(), waited: false };
                Ok((RequestOutcome::Granted, vec![LedgerAction::Record(event)]))
            },
            Decision::Deny => Err(EngineError::UnsafeRequest { pid, request: request.clone() }),
        }
    }

    fn request_greedy(
        &mut self,
        pid: Pid,
        request: &ResourceVector,
    ) -> Result<(RequestOutcome, Vec<LedgerAction>), EngineError> {
        self.state.validate_request(pid, request)?;
        // A participant waiting on units only it holds would wait forever.
        self.state.validate_attainable(pid, request)?;

        if request.fits_within(self.state.available()) {
            self.state.grant(pid, request)?;
            self.participants[pid.index()] = ParticipantState::Running;
            tracing::debug!("{} granted {}", pid, request);
            let event = TraceEvent::Granted { pid, request: request.clone(), waited: false };
            return Ok((RequestOutcome::Granted, vec![LedgerAction::Record(event)]));
        }

        let waiting_on = request.shortfall(self.state.available()).collect();
        self.participants[pid.index()] = ParticipantState::Blocked;
        self.queue.push_back(BlockedRequest { pid, request: request.clone() });
        tracing::debug!("{} blocked on {}", pid, request);

        let event = TraceEvent::Blocked { pid, request: request.clone(), waiting_on };
        Ok((RequestOutcome::Blocked, vec![LedgerAction::Record(event)]))
    }

    /// Hand units back. Queued requests that now fit are granted.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MalformedRequest` if the participant holds less
    /// than `units`; the ledger is unchanged.
    pub fn release(
        &mut self,
        pid: Pid,
        units: &ResourceVector,
    ) -> Result<Vec<LedgerAction>, EngineError> {
        let current = self.live(pid)?;
        if current == ParticipantState::Blocked {
            return Err(self.violation(format!("{pid} released while blocked")));
        }

        self.state.reclaim(pid, units)?;
        tracing::debug!("{} released {}", pid, units);

        let mut actions =
            vec![LedgerAction::Record(TraceEvent::Released { pid, units: units.clone() })];
        actions.extend(self.drain_queue()?);

        self.check_invariants()?;
        Ok(actions)
    }

    /// Participant ran its whole script; everything it holds is released.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MalformedRequest` if the participant is unknown
    /// or already terminated.
    pub fn finish(&mut self, pid: Pid) -> Result<Vec<LedgerAction>, EngineError> {
        let current = self.live(pid)?;
        if current == ParticipantState::Blocked {
            return Err(self.violation(format!("{pid} finished while blocked")));
        }

        let released = self.state.reclaim_all(pid)?;
        self.participants[pid.index()] = ParticipantState::Terminated(Termination::Completed);
        tracing::debug!("{} completed, released {}", pid, released);

        let mut actions = vec![LedgerAction::Record(TraceEvent::Completed { pid, released })];
        actions.extend(self.drain_queue()?);

        self.check_invariants()?;
        Ok(actions)
    }

    /// Cooperative suspension point. Halts the participant if the stop
    /// signal is raised; reports an earlier termination.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MalformedRequest` for an unknown participant.
    pub fn checkpoint(
        &mut self,
        pid: Pid,
    ) -> Result<(Checkpoint, Vec<LedgerAction>), EngineError> {
        match self.state(pid) {
            None => Err(EngineError::malformed(pid, MalformedReason::UnknownParticipant)),
            Some(ParticipantState::Terminated(termination)) => {
                Ok((Checkpoint::Stop(termination), Vec::new()))
            },
            Some(_) if self.stopped => {
                let actions = self.halt_participant(pid)?;
                self.check_invariants()?;
                Ok((Checkpoint::Stop(Termination::Halted), actions))
            },
            Some(_) => Ok((Checkpoint::Continue, Vec::new())),
        }
    }

    /// Raise the global stop signal. Every blocked participant is halted and
    /// woken; running participants halt at their next checkpoint.
    ///
    /// Idempotent: raising an already raised signal returns no actions.
    pub fn halt(&mut self) -> Result<Vec<LedgerAction>, EngineError> {
        if self.stopped {
            return Ok(Vec::new());
        }
        self.stopped = true;
        tracing::info!("stop signal raised");

        let mut actions = vec![LedgerAction::Record(TraceEvent::Halted)];
        let waiting: Vec<Pid> = self.queue.iter().map(|blocked| blocked.pid).collect();
        for pid in waiting {
            actions.extend(self.halt_participant(pid)?);
        }

        self.check_invariants()?;
        Ok(actions)
    }

    /// Terminate a deadlock victim: reclaim everything it holds, drop its
    /// pending request, wake it, and grant queued requests that now fit.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MalformedRequest` if the participant is unknown
    /// or already terminated.
    pub fn terminate(&mut self, pid: Pid) -> Result<Vec<LedgerAction>, EngineError> {
        self.live(pid)?;

        self.queue.retain(|blocked| blocked.pid != pid);
        let units = self.state.reclaim_all(pid)?;
        self.participants[pid.index()] = ParticipantState::Terminated(Termination::Victim);
        tracing::info!("{} terminated as victim, reclaimed {}", pid, units);

        let mut actions =
            vec![LedgerAction::Record(TraceEvent::Reclaimed { pid, units }), LedgerAction::Wake(pid)];
        actions.extend(self.drain_queue()?);

        self.check_invariants()?;
        Ok(actions)
    }

    /// Terminate `pid` only if it is still blocked on a wait-for cycle.
    ///
    /// Returns `Ok(None)` and changes nothing when the participant has been
    /// granted since the caller observed it, or when its cycle dissolved.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::terminate`].
    pub fn terminate_deadlocked(
        &mut self,
        pid: Pid,
    ) -> Result<Option<Vec<LedgerAction>>, EngineError> {
        if self.live(pid)? != ParticipantState::Blocked {
            return Ok(None);
        }
        if !WaitForGraph::build(&self.snapshot()).on_cycle(pid) {
            return Ok(None);
        }
        self.terminate(pid).map(Some)
    }

    fn halt_participant(&mut self, pid: Pid) -> Result<Vec<LedgerAction>, EngineError> {
        self.queue.retain(|blocked| blocked.pid != pid);
        let released = self.state.reclaim_all(pid)?;
        self.participants[pid.index()] = ParticipantState::Terminated(Termination::Halted);
        tracing::debug!("{} halted, released {}", pid, released);

        Ok(vec![LedgerAction::Record(TraceEvent::Aborted { pid, released }), LedgerAction::Wake(pid)])
    }

    /// Grant queued requests that fit, oldest first. A request that does not
    /// fit keeps its place; younger requests that do fit are still granted.
    ///
    /// The queue is FIFO among compatible waiters only: the longest-waiting
    /// request that fits goes first, and an older request that cannot fit
    /// never holds back a younger one on the same resource.
    fn drain_queue(&mut self) -> Result<Vec<LedgerAction>, EngineError> {
        let mut actions = Vec::new();
        if self.stopped {
            return Ok(actions);
        }

        let mut idx = 0;
        while idx < self.queue.len() {
            if !self.queue[idx].request.fits_within(self.state.available()) {
                idx += 1;
                continue;
            }
            let Some(BlockedRequest { pid, request }) = self.queue.remove(idx) else { break };
            self.state.grant(pid, &request)?;
            self.participants[pid.index()] = ParticipantState::Running;
            tracing::debug!("{} unblocked, granted {}", pid, request);

            actions.push(LedgerAction::Record(TraceEvent::Granted { pid, request, waited: true }));
            actions.push(LedgerAction::Wake(pid));
        }

        Ok(actions)
    }

    fn live(&self, pid: Pid) -> Result<ParticipantState, EngineError> {
        match self.state(pid) {
            None => Err(EngineError::malformed(pid, MalformedReason::UnknownParticipant)),
            Some(ParticipantState::Terminated(_)) => {
                Err(EngineError::malformed(pid, MalformedReason::ParticipantTerminated))
            },
            Some(state) => Ok(state),
        }
    }

    /// Verify conservation, claims, and that the blocked queue and
    /// participant states agree.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvariantViolation` with a full dump.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        self.state.check_invariants()?;

        for blocked in &self.queue {
            if self.state(blocked.pid) != Some(ParticipantState::Blocked) {
                return Err(self.violation(format!("{} queued but not blocked", blocked.pid)));
            }
        }
        for (idx, state) in self.participants.iter().enumerate() {
            let pid = Pid(idx);
            if *state == ParticipantState::Blocked
                && !self.queue.iter().any(|blocked| blocked.pid == pid)
            {
                return Err(self.violation(format!("{pid} blocked without a queued request")));
            }
        }
        if self.stopped && !self.queue.is_empty() {
            return Err(self.violation("requests still queued after stop".into()));
        }

        Ok(())
    }

    fn violation(&self, detail: String) -> EngineError {
        tracing::error!("invariant violation: {}", detail);
        EngineError::InvariantViolation { detail, dump: format!("{self:#?}") }
    }
}

//! Model world: a naive blocking ledger.

use gridlock_core::{ParticipantState, Termination, Units};

use super::operation::{
    ModelVector, Operation, OperationError, OperationResult, ParticipantId, RESOURCES,
};

/// Everything about a ledger that tests may compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Free units per resource type.
    pub available: Vec<Units>,
    /// Units held, one row per participant.
    pub held: Vec<Vec<Units>>,
    /// Participant states.
    pub states: Vec<ParticipantState>,
    /// Blocked participants, oldest first.
    pub queue: Vec<usize>,
    /// Whether the stop signal is up.
    pub stopped: bool,
}

/// Reference ledger.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    total: [Units; RESOURCES],
    available: [Units; RESOURCES],
    held: Vec<[Units; RESOURCES]>,
    states: Vec<ParticipantState>,
    queue: Vec<(usize, [Units; RESOURCES])>,
    stopped: bool,
}

impl ModelWorld {
    /// `participants` ready participants and every unit free.
    pub fn new(participants: usize, total: [u8; RESOURCES]) -> Self {
        let total = total.map(Units::from);
        Self {
            total,
            available: total,
            held: vec![[0; RESOURCES]; participants],
            states: vec![ParticipantState::Ready; participants],
            queue: Vec::new(),
            stopped: false,
        }
    }

    /// Units per resource type.
    pub fn total(&self) -> [Units; RESOURCES] {
        self.total
    }

    /// Apply an operation.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let result = match op {
            Operation::Request { pid, units } => self.request(*pid, *units),
            Operation::Release { pid, units } => self.release(*pid, *units),
            Operation::Finish { pid } => self.finish(*pid),
            Operation::Terminate { pid } => self.terminate(*pid),
            Operation::Checkpoint { pid } => self.checkpoint(*pid),
            Operation::Halt => {
                self.halt();
                Ok(())
            },
        };
        match result {
            Ok(()) => OperationResult::Ok,
            Err(err) => OperationResult::Error(err),
        }
    }

    /// Snapshot for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            available: self.available.to_vec(),
            held: self.held.iter().map(|row| row.to_vec()).collect(),
            states: self.states.clone(),
            queue: self.queue.iter().map(|(idx, _)| *idx).collect(),
            stopped: self.stopped,
        }
    }

    fn live(&self, pid: ParticipantId) -> Result<usize, OperationError> {
        let idx = usize::from(pid);
        match self.states.get(idx) {
            None => Err(OperationError::UnknownParticipant),
            Some(ParticipantState::Terminated(_)) => Err(OperationError::Terminated),
            Some(ParticipantState::Blocked) => Err(OperationError::WhileBlocked),
            Some(_) => Ok(idx),
        }
    }

    fn request(&mut self, pid: ParticipantId, units: ModelVector) -> Result<(), OperationError> {
        let idx = self.live(pid)?;
        if self.stopped {
            self.stop(idx, Termination::Halted);
            return Ok(());
        }

        let units = units.0.map(Units::from);
        // Counting its own holding, the request must fit in what exists.
        if (0..RESOURCES).any(|r| units[r] + self.held[idx][r] > self.total[r]) {
            return Err(OperationError::Malformed);
        }

        if (0..RESOURCES).all(|r| units[r] <= self.available[r]) {
            self.grant(idx, units);
        } else {
            self.states[idx] = ParticipantState::Blocked;
            self.queue.push((idx, units));
        }
        Ok(())
    }

    fn release(&mut self, pid: ParticipantId, units: ModelVector) -> Result<(), OperationError> {
        let idx = self.live(pid)?;
        let units = units.0.map(Units::from);
        if (0..RESOURCES).any(|r| units[r] > self.held[idx][r]) {
            return Err(OperationError::Malformed);
        }

        for r in 0..RESOURCES {
            self.held[idx][r] -= units[r];
            self.available[r] += units[r];
        }
        self.drain();
        Ok(())
    }

    fn finish(&mut self, pid: ParticipantId) -> Result<(), OperationError> {
        let idx = self.live(pid)?;
        self.stop(idx, Termination::Completed);
        self.drain();
        Ok(())
    }

    fn terminate(&mut self, pid: ParticipantId) -> Result<(), OperationError> {
        // Victims may be blocked.
        let idx = match self.live(pid) {
            Err(OperationError::WhileBlocked) => usize::from(pid),
            other => other?,
        };
        self.stop(idx, Termination::Victim);
        self.drain();
        Ok(())
    }

    fn checkpoint(&mut self, pid: ParticipantId) -> Result<(), OperationError> {
        let idx = usize::from(pid);
        match self.states.get(idx) {
            None => Err(OperationError::UnknownParticipant),
            Some(ParticipantState::Terminated(_)) => Ok(()),
            Some(_) => {
                if self.stopped {
                    self.stop(idx, Termination::Halted);
                }
                Ok(())
            },
        }
    }

    fn halt(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let waiting: Vec<usize> = self.queue.iter().map(|(idx, _)| *idx).collect();
        for idx in waiting {
            self.stop(idx, Termination::Halted);
        }
    }

    fn grant(&mut self, idx: usize, units: [Units; RESOURCES]) {
        for r in 0..RESOURCES {
            self.available[r] -= units[r];
            self.held[idx][r] += units[r];
        }
        self.states[idx] = ParticipantState::Running;
    }

    fn stop(&mut self, idx: usize, termination: Termination) {
        self.queue.retain(|(queued, _)| *queued != idx);
        for r in 0..RESOURCES {
            self.available[r] += self.held[idx][r];
            self.held[idx][r] = 0;
        }
        self.states[idx] = ParticipantState::Terminated(termination);
    }

    fn drain(&mut self) {
        if self.stopped {
            return;
        }
        let mut pos = 0;
        while pos < self.queue.len() {
            let (idx, units) = self.queue[pos];
            if (0..RESOURCES).all(|r| units[r] <= self.available[r]) {
                self.queue.remove(pos);
                self.grant(idx, units);
            } else {
                pos += 1;
            }
        }
    }
}

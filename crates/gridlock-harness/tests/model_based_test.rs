//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! ledger behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    RealWorld      Compare
//!      (reference)   (Ledger)       Results + State
//! ```

use gridlock_core::{EngineError, Ledger, MalformedReason, ParticipantState, Pid, ResourceVector};
use gridlock_harness::{
    ModelVector, ModelWorld, ObservableState, Operation, OperationError, OperationResult,
    ParticipantId, RESOURCES,
};
use proptest::prelude::*;

/// Real system wrapper that mirrors ModelWorld's interface.
struct RealWorld {
    ledger: Ledger,
}

impl RealWorld {
    fn new(num_participants: usize, total: [u8; RESOURCES]) -> Self {
        let total = ResourceVector::new(total.iter().map(|&units| u32::from(units)).collect());
        Self { ledger: Ledger::greedy(total, num_participants) }
    }

    fn apply(&mut self, op: &Operation) -> OperationResult {
        let result = match op {
            Operation::Request { pid, units } => {
                self.ledger.request(pid_of(*pid), &units.to_resource_vector()).map(|_| ())
            },
            Operation::Release { pid, units } => {
                self.ledger.release(pid_of(*pid), &units.to_resource_vector()).map(|_| ())
            },
            Operation::Finish { pid } => self.ledger.finish(pid_of(*pid)).map(|_| ()),
            Operation::Terminate { pid } => self.ledger.terminate(pid_of(*pid)).map(|_| ()),
            Operation::Checkpoint { pid } => self.ledger.checkpoint(pid_of(*pid)).map(|_| ()),
            Operation::Halt => self.ledger.halt().map(|_| ()),
        };

        match result {
            Ok(()) => OperationResult::Ok,
            Err(err) => OperationResult::Error(classify(&err)),
        }
    }

    fn observable_state(&self) -> ObservableState {
        let resources = self.ledger.resources();
        ObservableState {
            available: resources.available().as_slice().to_vec(),
            held: resources.allocations().iter().map(|row| row.as_slice().to_vec()).collect(),
            states: self.ledger.participants().to_vec(),
            queue: self.ledger.blocked().map(|blocked| blocked.pid.index()).collect(),
            stopped: self.ledger.is_stopped(),
        }
    }
}

fn pid_of(pid: ParticipantId) -> Pid {
    Pid(usize::from(pid))
}

fn classify(err: &EngineError) -> OperationError {
    match err.malformed_reason() {
        Some(MalformedReason::UnknownParticipant) => OperationError::UnknownParticipant,
        Some(MalformedReason::ParticipantTerminated) => OperationError::Terminated,
        Some(_) => OperationError::Malformed,
        None if err.is_fatal() => OperationError::WhileBlocked,
        None => panic!("unexpected error from greedy ledger: {err}"),
    }
}

/// Strategy for generating small vectors.
fn vector_strategy() -> impl Strategy<Value = ModelVector> {
    prop::array::uniform2(0..4u8).prop_map(ModelVector)
}

/// Strategy for generating operations with mostly valid participant ids.
fn operation_strategy(num_participants: u8) -> impl Strategy<Value = Operation> {
    // One past the end exercises the unknown-participant path.
    let pid = 0..=num_participants;

    prop_oneof![
        // Weight towards the operations that move units
        6 => (pid.clone(), vector_strategy())
            .prop_map(|(pid, units)| Operation::Request { pid, units }),
        3 => (pid.clone(), vector_strategy())
            .prop_map(|(pid, units)| Operation::Release { pid, units }),
        2 => pid.clone().prop_map(|pid| Operation::Finish { pid }),
        1 => pid.clone().prop_map(|pid| Operation::Terminate { pid }),
        1 => pid.prop_map(|pid| Operation::Checkpoint { pid }),
        1 => Just(Operation::Halt),
    ]
}

proptest! {
    /// Verify that results and state match between model and real ledger
    /// after every operation.
    #[test]
    fn prop_model_matches_real(
        num_participants in 2..5usize,
        total in prop::array::uniform2(1..4u8),
        ops in prop::collection::vec(operation_strategy(4), 0..60)
    ) {
        let mut model = ModelWorld::new(num_participants, total);
        let mut real = RealWorld::new(num_participants, total);

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op);

            prop_assert_eq!(
                &model_result,
                &real_result,
                "Divergence at operation {}: {:?}",
                i, op
            );
            prop_assert_eq!(
                model.observable_state(),
                real.observable_state(),
                "State divergence after operation {}: {:?}",
                i, op
            );
        }
    }

    /// Verify model invariants hold after any operation sequence.
    #[test]
    fn prop_model_invariants(
        num_participants in 2..5usize,
        total in prop::array::uniform2(1..4u8),
        ops in prop::collection::vec(operation_strategy(4), 0..100)
    ) {
        let mut model = ModelWorld::new(num_participants, total);

        for op in ops {
            let _ = model.apply(&op);
        }

        let state = model.observable_state();

        // Invariant: units are conserved
        for (r, total) in model.total().iter().enumerate() {
            let held: u32 = state.held.iter().map(|row| row[r]).sum();
            prop_assert_eq!(state.available[r] + held, *total);
        }

        // Invariant: exactly the blocked participants are queued
        for (idx, participant) in state.states.iter().enumerate() {
            prop_assert_eq!(
                *participant == ParticipantState::Blocked,
                state.queue.contains(&idx),
                "P{} is {:?} but queue is {:?}",
                idx, participant, state.queue
            );
        }

        // Invariant: terminated participants hold nothing
        for (participant, held) in state.states.iter().zip(&state.held) {
            if participant.is_terminated() {
                prop_assert!(held.iter().all(|&units| units == 0));
            }
        }

        // Invariant: nothing waits once the stop signal is up
        if state.stopped {
            prop_assert!(state.queue.is_empty());
        }
    }

    /// Verify that a second halt changes nothing.
    #[test]
    fn prop_halt_idempotent(
        ops in prop::collection::vec(operation_strategy(3), 0..30)
    ) {
        let mut model = ModelWorld::new(3, [2, 2]);
        for op in &ops {
            let _ = model.apply(op);
        }

        model.apply(&Operation::Halt);
        let once = model.observable_state();
        model.apply(&Operation::Halt);

        prop_assert_eq!(once, model.observable_state());
    }
}

#[cfg(test)]
mod smoke_tests {
    use gridlock_core::Termination;

    use super::*;

    fn request(pid: ParticipantId, units: [u8; RESOURCES]) -> Operation {
        Operation::Request { pid, units: ModelVector(units) }
    }

    /// Basic smoke test: both worlds agree on a hand-written deadlock.
    #[test]
    fn model_and_real_agree_on_a_deadlock() {
        let ops = [
            request(0, [1, 0]),
            request(1, [0, 1]),
            request(0, [0, 1]),
            request(1, [1, 0]),
            Operation::Terminate { pid: 1 },
            Operation::Finish { pid: 0 },
        ];

        let mut model = ModelWorld::new(2, [1, 1]);
        let mut real = RealWorld::new(2, [1, 1]);
        for op in &ops {
            assert_eq!(model.apply(op), real.apply(op), "{op:?}");
        }

        let state = real.observable_state();
        assert_eq!(state, model.observable_state());
        assert_eq!(state.available, vec![1, 1]);
        assert_eq!(
            state.states,
            vec![
                ParticipantState::Terminated(Termination::Completed),
                ParticipantState::Terminated(Termination::Victim),
            ]
        );
    }

    #[test]
    fn over_capacity_is_malformed() {
        let mut real = RealWorld::new(1, [1, 1]);
        assert_eq!(
            real.apply(&request(0, [2, 0])),
            OperationResult::Error(OperationError::Malformed)
        );
        assert_eq!(real.observable_state().states, vec![ParticipantState::Ready]);
    }

    #[test]
    fn acting_while_blocked_is_reported() {
        let mut real = RealWorld::new(2, [1, 1]);
        real.apply(&request(0, [1, 0]));
        real.apply(&request(1, [1, 0]));

        assert_eq!(
            real.apply(&Operation::Finish { pid: 1 }),
            OperationResult::Error(OperationError::WhileBlocked)
        );
    }
}

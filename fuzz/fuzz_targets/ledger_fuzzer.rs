//! Fuzz target for the blocking [`Ledger`]
//!
//! Keep the arbiter honest under arbitrary driver call sequences.
//!
//! # Strategy
//!
//! - Operation sequences: requests, releases, finishes, terminations,
//!   checkpoints and halts in any order, for any participant
//! - Out-of-range pids and over-capacity vectors
//! - Every operation is mirrored on the reference model
//!
//! # Invariants
//!
//! - Ledger and model agree on every result and every observable field
//! - `check_invariants` never fails after a refused operation
//! - Units are conserved: available plus held equals total
//! - Terminated participants hold nothing
//! - NEVER panic on a malformed operation

#![no_main]

use arbitrary::Arbitrary;
use gridlock_core::{Ledger, MalformedReason, Pid, ResourceVector};
use gridlock_harness::{ModelWorld, Operation, OperationError, OperationResult, RESOURCES};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    /// Participant count (mapped to 1..=6).
    participants: u8,
    /// Units per resource type (mapped to 1..=4).
    total: [u8; RESOURCES],
    /// Operation sequence to apply.
    ops: Vec<Operation>,
}

fuzz_target!(|input: FuzzInput| {
    let participants = usize::from(input.participants % 6) + 1;
    let total = input.total.map(|units| units % 4 + 1);

    let mut model = ModelWorld::new(participants, total);
    let mut ledger = Ledger::greedy(
        ResourceVector::new(total.iter().map(|&units| u32::from(units)).collect()),
        participants,
    );

    for op in &input.ops {
        let expected = model.apply(op);
        let actual = apply(&mut ledger, op);
        assert_eq!(expected, actual, "{op:?}");

        // Acting while blocked is the only fatal path and leaves the ledger intact.
        assert!(ledger.check_invariants().is_ok());

        let resources = ledger.resources();
        let state = model.observable_state();
        assert_eq!(resources.available().as_slice(), state.available.as_slice());
        for (idx, row) in resources.allocations().iter().enumerate() {
            assert_eq!(row.as_slice(), state.held[idx].as_slice());
            if ledger.state(Pid(idx)).is_some_and(|s| s.is_terminated()) {
                assert!(row.is_zero());
            }
        }
        assert_eq!(ledger.participants(), state.states.as_slice());
        assert_eq!(ledger.is_stopped(), state.stopped);
    }
});

fn apply(ledger: &mut Ledger, op: &Operation) -> OperationResult {
    let pid = |raw: u8| Pid(usize::from(raw));
    let result = match op {
        Operation::Request { pid: p, units } => {
            ledger.request(pid(*p), &units.to_resource_vector()).map(|_| ())
        },
        Operation::Release { pid: p, units } => {
            ledger.release(pid(*p), &units.to_resource_vector()).map(|_| ())
        },
        Operation::Finish { pid: p } => ledger.finish(pid(*p)).map(|_| ()),
        Operation::Terminate { pid: p } => ledger.terminate(pid(*p)).map(|_| ()),
        Operation::Checkpoint { pid: p } => ledger.checkpoint(pid(*p)).map(|_| ()),
        Operation::Halt => ledger.halt().map(|_| ()),
    };

    match result {
        Ok(()) => OperationResult::Ok,
        Err(err) => OperationResult::Error(match err.malformed_reason() {
            Some(MalformedReason::UnknownParticipant) => OperationError::UnknownParticipant,
            Some(MalformedReason::ParticipantTerminated) => OperationError::Terminated,
            Some(_) => OperationError::Malformed,
            None => OperationError::WhileBlocked,
        }),
    }
}

//! Banker's algorithm tests.

use gridlock_core::{
    Decision, EngineError, Pid, ResourceState, ResourceVector, evaluate_request, is_safe,
    safe_sequence,
};
use proptest::prelude::*;

fn rows(rows: &[[u32; 3]]) -> Vec<ResourceVector> {
    rows.iter().map(|row| ResourceVector::from(*row)).collect()
}

fn textbook() -> ResourceState {
    ResourceState::with_claims(
        [10, 5, 7].into(),
        rows(&[[7, 5, 3], [3, 2, 2], [9, 0, 2], [2, 2, 2], [4, 3, 3]]),
        rows(&[[0, 1, 0], [2, 0, 0], [3, 0, 2], [2, 1, 1], [0, 0, 2]]),
    )
    .unwrap()
}

fn pids(ids: &[usize]) -> Vec<Pid> {
    ids.iter().copied().map(Pid).collect()
}

#[test]
fn textbook_initial_safe_sequence() {
    let state = textbook();
    assert_eq!(safe_sequence(&state), Some(pids(&[1, 3, 4, 0, 2])));
}

#[test]
fn textbook_p1_request_is_granted() {
    let mut state = textbook();
    let decision = evaluate_request(&mut state, Pid(1), &[1, 0, 2].into()).unwrap();

    assert_eq!(decision, Decision::Grant { safe_sequence: pids(&[1, 3, 4, 0, 2]) });
    assert_eq!(state.available(), &ResourceVector::from([2, 3, 0]));
    assert_eq!(state.allocation(Pid(1)), Some(&ResourceVector::from([3, 0, 2])));
    assert!(is_safe(&state));
}

#[test]
fn textbook_p0_request_is_denied() {
    let mut state = textbook();
    let before = state.clone();

    let decision = evaluate_request(&mut state, Pid(0), &[3, 3, 0].into()).unwrap();

    assert_eq!(decision, Decision::Deny);
    assert_eq!(state, before);
}

#[test]
fn textbook_p3_request_after_p1_is_granted() {
    let mut state = textbook();
    evaluate_request(&mut state, Pid(1), &[1, 0, 2].into()).unwrap();

    let decision = evaluate_request(&mut state, Pid(3), &[0, 1, 0].into()).unwrap();
    assert!(matches!(decision, Decision::Grant { .. }));
    assert_eq!(state.need(Pid(3)), Some(ResourceVector::from([0, 0, 1])));
}

#[test]
fn request_beyond_need_skips_the_scan() {
    let mut state = textbook();
    let result = evaluate_request(&mut state, Pid(4), &[5, 0, 0].into());
    assert!(matches!(result, Err(EngineError::MalformedRequest { .. })));
    assert_eq!(state, textbook());
}

#[test]
fn request_beyond_available_is_malformed() {
    let mut state = textbook();
    let result = evaluate_request(&mut state, Pid(2), &[6, 0, 0].into());
    assert!(matches!(result, Err(EngineError::MalformedRequest { .. })));
}

/// Consistent avoidance state: per participant an allocation and extra claim,
/// plus some free units per resource.
fn arb_state() -> impl Strategy<Value = ResourceState> {
    (1usize..=3, 1usize..=4).prop_flat_map(|(resources, participants)| {
        let row = || prop::collection::vec(0u32..=3, resources);
        (
            prop::collection::vec(row(), participants),
            prop::collection::vec(row(), participants),
            row(),
        )
            .prop_map(|(held, extra, free)| {
                let mut total = free;
                for alloc in &held {
                    for (slot, units) in total.iter_mut().zip(alloc) {
                        *slot += units;
                    }
                }
                let claims = held
                    .iter()
                    .zip(&extra)
                    .map(|(alloc, more)| {
                        alloc.iter().zip(more).map(|(a, b)| a + b).collect::<Vec<_>>().into()
                    })
                    .collect();
                let held = held.into_iter().map(ResourceVector::from).collect();
                ResourceState::with_claims(total.into(), claims, held)
                    .unwrap_or_else(|err| unreachable!("generated state is consistent: {err}"))
            })
    })
}

fn arb_request(
    participants: usize,
    resources: usize,
) -> impl Strategy<Value = (Pid, ResourceVector)> {
    (0..participants, prop::collection::vec(0u32..=3, resources))
        .prop_map(|(pid, units)| (Pid(pid), ResourceVector::from(units)))
}

proptest! {
    #[test]
    fn grant_implies_safe_and_deny_restores(
        (state, (pid, request)) in arb_state().prop_flat_map(|state| {
            let request = arb_request(state.participants(), state.resources());
            (Just(state), request)
        })
    ) {
        let mut after = state.clone();
        match evaluate_request(&mut after, pid, &request) {
            Ok(Decision::Grant { safe_sequence }) => {
                prop_assert!(is_safe(&after));
                prop_assert_eq!(safe_sequence.len(), after.participants());
            },
            Ok(Decision::Deny) => prop_assert_eq!(&after, &state),
            Err(err) => {
                prop_assert!(!err.is_fatal());
                prop_assert_eq!(&after, &state);
            },
        }
        prop_assert!(after.check_invariants().is_ok());
    }

    #[test]
    fn safe_sequence_is_a_permutation(state in arb_state()) {
        if let Some(sequence) = safe_sequence(&state) {
            let mut sorted = sequence.clone();
            sorted.sort();
            prop_assert_eq!(sorted, (0..state.participants()).map(Pid).collect::<Vec<_>>());
        }
    }
}

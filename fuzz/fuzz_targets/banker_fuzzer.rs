//! Fuzz target for the Banker's safety check
//!
//! # Strategy
//!
//! - Arbitrary claim and allocation matrices over up to four participants
//!   and three resource types
//! - Arbitrary requests, including ones beyond need or availability
//!
//! # Invariants
//!
//! - A safe sequence lists every participant exactly once
//! - A granted request leaves the state safe
//! - A denied or refused request leaves the state untouched
//! - NEVER panic on inconsistent input

#![no_main]

use arbitrary::Arbitrary;
use gridlock_core::{Decision, Pid, ResourceState, ResourceVector, evaluate_request, safe_sequence};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    total: [u8; 3],
    claims: Vec<[u8; 3]>,
    held: Vec<[u8; 3]>,
    pid: u8,
    request: [u8; 3],
}

fn vector(units: [u8; 3]) -> ResourceVector {
    ResourceVector::new(units.iter().map(|&u| u32::from(u % 8)).collect())
}

fuzz_target!(|input: FuzzInput| {
    let rows = input.claims.len().min(input.held.len()).min(4);
    let claims = input.claims[..rows].iter().map(|&row| vector(row)).collect();
    let held = input.held[..rows].iter().map(|&row| vector(row)).collect();

    // Inconsistent matrices are rejected, never trusted.
    let Ok(mut state) = ResourceState::with_claims(vector(input.total), claims, held) else {
        return;
    };

    let Some(sequence) = safe_sequence(&state) else {
        return;
    };
    let mut sorted = sequence.clone();
    sorted.sort();
    assert_eq!(sorted, (0..rows).map(Pid).collect::<Vec<_>>());

    let before = state.clone();
    let pid = Pid(usize::from(input.pid) % (rows + 1));
    match evaluate_request(&mut state, pid, &vector(input.request)) {
        Ok(Decision::Grant { safe_sequence: granted }) => {
            assert_eq!(safe_sequence(&state).as_ref(), Some(&granted));
            assert!(state.check_invariants().is_ok());
        },
        Ok(Decision::Deny) | Err(_) => assert_eq!(state, before),
    }
});

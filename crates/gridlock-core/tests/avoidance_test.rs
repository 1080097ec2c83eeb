//! Avoidance walkthrough tests.

use gridlock_core::{
    AvoidanceScenario, AvoidanceStep, Pid, TraceEvent, Verdict, is_safe, run_avoidance,
};

#[test]
fn textbook_walkthrough_trace() {
    let trace = AvoidanceScenario::textbook().run().unwrap();

    insta::assert_snapshot!(trace.to_string(), @r"
    initial state: safe sequence [P1, P3, P4, P0, P2]
    P0 requests [3, 3, 0]: DENIED (unsafe), safe sequence [P1, P3, P4, P0, P2]
    P1 requests [1, 0, 2]: GRANTED, safe sequence [P1, P3, P4, P0, P2]
    P3 requests [0, 1, 0]: GRANTED, safe sequence [P1, P3, P4, P0, P2]
    ");
}

#[test]
fn denied_request_does_not_block_the_script() {
    let scenario = AvoidanceScenario::textbook();
    let trace = scenario.run().unwrap();

    let verdicts: Vec<_> = trace.verdicts().map(|(pid, verdict)| (pid, verdict.clone())).collect();
    assert_eq!(verdicts.len(), scenario.steps.len());
    assert!(matches!(verdicts[0], (Pid(0), Verdict::Denied { safe_sequence: Some(_) })));
    assert!(matches!(verdicts[1], (Pid(1), Verdict::Granted { .. })));
}

#[test]
fn release_frees_units_for_a_later_request() {
    let mut scenario = AvoidanceScenario::textbook();
    scenario.steps = vec![
        AvoidanceStep::Request { pid: Pid(1), request: [1, 2, 2].into() },
        AvoidanceStep::Release { pid: Pid(1), units: [3, 2, 2].into() },
        AvoidanceStep::Request { pid: Pid(4), request: [3, 3, 0].into() },
    ];

    let trace = scenario.run().unwrap();
    let events: Vec<_> = trace.events().cloned().collect();

    assert!(events.contains(&TraceEvent::Released { pid: Pid(1), units: [3, 2, 2].into() }));
    let last = trace.verdicts().last().map(|(_, verdict)| verdict.clone());
    assert!(matches!(last, Some(Verdict::Granted { .. })));
}

#[test]
fn unsafe_initial_state_is_reported() {
    let trace =
        run_avoidance(vec![[2].into(), [2].into()], vec![[1].into(), [1].into()], [2].into(), &[
            AvoidanceStep::Request { pid: Pid(0), request: [0].into() },
        ])
        .unwrap();

    assert_eq!(trace.events().next(), Some(&TraceEvent::SafeState { safe_sequence: None }));
    let verdict = trace.verdicts().next().map(|(_, verdict)| verdict.clone());
    assert_eq!(verdict, Some(Verdict::Denied { safe_sequence: None }));
}

#[test]
fn every_grant_leaves_a_safe_state() {
    let scenario = AvoidanceScenario::textbook();
    let state = gridlock_core::ResourceState::with_claims(
        scenario.total_units.clone(),
        scenario.max_claim.clone(),
        scenario.allocation.clone(),
    )
    .unwrap();
    assert!(is_safe(&state));

    for (_, verdict) in scenario.run().unwrap().verdicts() {
        if let Verdict::Granted { safe_sequence } = verdict {
            assert_eq!(safe_sequence.len(), state.participants());
        }
    }
}

//! Scenario definitions: fixed topology plus per-participant scripts.

use serde::{Deserialize, Serialize};

use crate::{
    error::EngineError,
    types::{Pid, ResourceVector},
};

/// One scripted action of a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Acquire these units, blocking if necessary.
    Request(ResourceVector),
    /// Hand these units back.
    Release(ResourceVector),
    /// Release everything held and leave. Implied at the end of a script.
    Exit,
}

/// Ordered steps of one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantScript {
    /// Steps in issue order.
    pub steps: Vec<Step>,
}

impl ParticipantScript {
    /// Script from steps.
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

/// Input of the detection and resolution modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Units per resource type.
    pub total_units: ResourceVector,
    /// One script per participant, indexed by pid.
    pub scripts: Vec<ParticipantScript>,
}

impl Scenario {
    /// Scenario from totals and scripts.
    pub fn new(total_units: ResourceVector, scripts: Vec<ParticipantScript>) -> Self {
        Self { total_units, scripts }
    }

    /// Three single-unit resources; `Pi` takes `Ri` then `R(i+1 mod 3)`.
    pub fn circular_wait() -> Self {
        Self::build_ring(3)
    }

    /// Largest ring [`Scenario::ring`] builds. Every script vector spans
    /// every resource, so a ring costs `n * n` units of memory.
    pub const MAX_RING: usize = 64;

    /// `participants` single-unit resources in a hold-and-wait ring.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidScenario` for fewer than two participants
    /// (a participant cannot wait on itself) or more than [`Self::MAX_RING`].
    pub fn ring(participants: usize) -> Result<Self, EngineError> {
        if participants < 2 {
            return Err(EngineError::InvalidScenario(format!(
                "a ring needs at least two participants, got {participants}"
            )));
        }
        if participants > Self::MAX_RING {
            return Err(EngineError::InvalidScenario(format!(
                "a ring holds at most {} participants, got {participants}",
                Self::MAX_RING
            )));
        }
        Ok(Self::build_ring(participants))
    }

    fn build_ring(participants: usize) -> Self {
        let unit = |resource: usize| {
            let mut units = vec![0; participants];
            units[resource] = 1;
            ResourceVector::new(units)
        };

        let scripts = (0..participants)
            .map(|idx| {
                ParticipantScript::new(vec![
                    Step::Request(unit(idx)),
                    Step::Request(unit((idx + 1) % participants)),
                    Step::Exit,
                ])
            })
            .collect();

        Self { total_units: ResourceVector::new(vec![1; participants]), scripts }
    }

    /// Number of participants.
    pub fn participants(&self) -> usize {
        self.scripts.len()
    }

    /// Number of resource types.
    pub fn resources(&self) -> usize {
        self.total_units.len()
    }

    /// Check that every vector in every script covers every resource type.
    ///
    /// Vectors exceeding capacity are left to the arbiter, which refuses
    /// them at run time as malformed.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidScenario` naming the first bad step.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (idx, script) in self.scripts.iter().enumerate() {
            for (step_idx, step) in script.steps.iter().enumerate() {
                let units = match step {
                    Step::Request(units) | Step::Release(units) => units,
                    Step::Exit => continue,
                };
                if units.len() != self.resources() {
                    return Err(EngineError::InvalidScenario(format!(
                        "{} step {step_idx}: vector {units} has {} entries, expected {}",
                        Pid(idx),
                        units.len(),
                        self.resources()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One scripted action of the avoidance walkthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvoidanceStep {
    /// `pid` requests `request`.
    Request {
        /// Requesting participant.
        pid: Pid,
        /// Requested units.
        request: ResourceVector,
    },
    /// `pid` releases `units`.
    Release {
        /// Releasing participant.
        pid: Pid,
        /// Released units.
        units: ResourceVector,
    },
}

/// Input of the avoidance mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvoidanceScenario {
    /// Units per resource type.
    pub total_units: ResourceVector,
    /// Declared maximum claim per participant.
    pub max_claim: Vec<ResourceVector>,
    /// Units held per participant before the script starts.
    pub allocation: Vec<ResourceVector>,
    /// Requests and releases, applied in order.
    pub steps: Vec<AvoidanceStep>,
}

impl AvoidanceScenario {
    /// Five participants over totals `[10, 5, 7]`: `P0` asks for
    /// `[3, 3, 0]` (unsafe), `P1` for `[1, 0, 2]` and `P3` for `[0, 1, 0]`.
    pub fn textbook() -> Self {
        fn rows(rows: [[u32; 3]; 5]) -> Vec<ResourceVector> {
            rows.into_iter().map(ResourceVector::from).collect()
        }

        Self {
            total_units: [10, 5, 7].into(),
            max_claim: rows([[7, 5, 3], [3, 2, 2], [9, 0, 2], [2, 2, 2], [4, 3, 3]]),
            allocation: rows([[0, 1, 0], [2, 0, 0], [3, 0, 2], [2, 1, 1], [0, 0, 2]]),
            steps: vec![
                AvoidanceStep::Request { pid: Pid(0), request: [3, 3, 0].into() },
                AvoidanceStep::Request { pid: Pid(1), request: [1, 0, 2].into() },
                AvoidanceStep::Request { pid: Pid(3), request: [0, 1, 0].into() },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_wait_is_three_ring() {
        let scenario = Scenario::circular_wait();
        assert_eq!(scenario, Scenario::ring(3).unwrap());
        assert_eq!(scenario.total_units, ResourceVector::from([1, 1, 1]));
        assert_eq!(scenario.scripts[2].steps, vec![
            Step::Request([0, 0, 1].into()),
            Step::Request([1, 0, 0].into()),
            Step::Exit,
        ]);
        scenario.validate().unwrap();
    }

    #[test]
    fn degenerate_ring_is_rejected() {
        assert!(Scenario::ring(1).is_err());
    }

    #[test]
    fn oversized_ring_is_rejected() {
        assert_eq!(Scenario::ring(Scenario::MAX_RING).unwrap().participants(), Scenario::MAX_RING);
        let err = Scenario::ring(Scenario::MAX_RING + 1).unwrap_err();
        assert_eq!(err.to_string(), "invalid scenario: a ring holds at most 64 participants, got 65");
    }

    #[test]
    fn validate_rejects_short_vector() {
        let scenario = Scenario::new([1, 1].into(), vec![ParticipantScript::new(vec![
            Step::Request([1].into()),
        ])]);
        let err = scenario.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid scenario: P0 step 0: vector [1] has 1 entries, expected 2"
        );
    }
}

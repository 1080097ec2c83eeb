//! Seeded scenario generation.
//!
//! Generated scripts never ask for more than a participant could hold with
//! every other unit free, and only release what they hold. Every blocked
//! request therefore either waits on someone who can still make progress or
//! sits on a wait-for cycle, so resolution runs always finish.

use gridlock_core::{EngineError, ParticipantScript, ResourceVector, Scenario, Step, Units};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Maximum units of one resource type in a generated scenario.
const MAX_UNITS: Units = 3;

/// Maximum scripted requests and releases per participant.
const MAX_STEPS: usize = 5;

/// Deterministic source of random scenarios.
pub struct ScenarioGenerator {
    rng: ChaCha8Rng,
}

impl ScenarioGenerator {
    /// Generator whose output is fixed by `seed`.
    pub fn new(seed: u64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// Random scenario over `resources` types shared by `participants`.
    pub fn scenario(&mut self, participants: usize, resources: usize) -> Scenario {
        let total: Vec<Units> =
            (0..resources).map(|_| self.rng.gen_range(1..=MAX_UNITS)).collect();
        let scripts = (0..participants).map(|_| self.script(&total)).collect();
        Scenario::new(ResourceVector::new(total), scripts)
    }

    fn script(&mut self, total: &[Units]) -> ParticipantScript {
        let mut held = vec![0; total.len()];
        let mut steps = Vec::new();

        for _ in 0..self.rng.gen_range(1..=MAX_STEPS) {
            let holds_any = held.iter().any(|&units| units > 0);
            if holds_any && self.rng.gen_bool(0.3) {
                let release: Vec<Units> =
                    held.iter().map(|&units| self.rng.gen_range(0..=units)).collect();
                for (slot, units) in held.iter_mut().zip(&release) {
                    *slot -= units;
                }
                steps.push(Step::Release(ResourceVector::new(release)));
            } else {
                let request: Vec<Units> = total
                    .iter()
                    .zip(&held)
                    .map(|(&total, &held)| self.rng.gen_range(0..=total - held))
                    .collect();
                for (slot, units) in held.iter_mut().zip(&request) {
                    *slot += units;
                }
                steps.push(Step::Request(ResourceVector::new(request)));
            }
        }

        steps.push(Step::Exit);
        ParticipantScript::new(steps)
    }
}

/// Hold-and-wait ring of `ring` participants plus `tail` participants that
/// each want the ring's first resource once.
///
/// Tail participants wait on the ring without ever being part of its cycle.
///
/// # Errors
///
/// Returns `EngineError::InvalidScenario` if `ring` is below two.
pub fn ring_with_tail(ring: usize, tail: usize) -> Result<Scenario, EngineError> {
    let mut scenario = Scenario::ring(ring)?;

    let mut first = vec![0; ring];
    first[0] = 1;
    let tail_script =
        ParticipantScript::new(vec![Step::Request(ResourceVector::new(first)), Step::Exit]);
    scenario.scripts.extend(std::iter::repeat_n(tail_script, tail));

    Ok(scenario)
}

//! Run modes.

use std::{fmt, str::FromStr};

use crate::scenario::{AvoidanceScenario, Scenario};

/// What a run does, with the input it needs. Dispatched once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Banker's walkthrough; refused requests never block.
    Avoidance(AvoidanceScenario),
    /// Greedy grants; stop everything on the first cycle.
    Detection(Scenario),
    /// Greedy grants; terminate victims until no cycle remains.
    Resolution(Scenario),
}

impl Mode {
    /// Which mode this is.
    pub fn kind(&self) -> ModeKind {
        match self {
            Self::Avoidance(_) => ModeKind::Avoidance,
            Self::Detection(_) => ModeKind::Detection,
            Self::Resolution(_) => ModeKind::Resolution,
        }
    }

    /// Mode with its built-in scenario: the textbook claims for avoidance,
    /// the three-participant ring otherwise.
    pub fn builtin(kind: ModeKind) -> Self {
        match kind {
            ModeKind::Avoidance => Self::Avoidance(AvoidanceScenario::textbook()),
            ModeKind::Detection => Self::Detection(Scenario::circular_wait()),
            ModeKind::Resolution => Self::Resolution(Scenario::circular_wait()),
        }
    }
}

/// Mode without its input, as selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKind {
    /// See [`Mode::Avoidance`].
    Avoidance,
    /// See [`Mode::Detection`].
    Detection,
    /// See [`Mode::Resolution`].
    Resolution,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avoidance => write!(f, "avoidance"),
            Self::Detection => write!(f, "detection"),
            Self::Resolution => write!(f, "resolution"),
        }
    }
}

impl FromStr for ModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avoidance" => Ok(Self::Avoidance),
            "detection" => Ok(Self::Detection),
            "resolution" => Ok(Self::Resolution),
            other => Err(format!(
                "unknown mode '{other}' (expected avoidance, detection or resolution)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_kind() {
        for kind in [ModeKind::Avoidance, ModeKind::Detection, ModeKind::Resolution] {
            assert_eq!(Mode::builtin(kind).kind(), kind);
            assert_eq!(kind.to_string().parse::<ModeKind>(), Ok(kind));
        }
    }
}

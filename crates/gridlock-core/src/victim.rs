//! Victim selection for deadlock resolution.
//!
//! Picks which participant on a detected cycle gets terminated. The policy
//! sees the same snapshot the cycle was found on.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::{ledger::LedgerSnapshot, types::Pid, wait_for::Cycle};

/// Policy for choosing a deadlock victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum VictimPolicy {
    /// Highest pid on the cycle.
    #[default]
    HighestPid,

    /// Fewest units held, so the least work is thrown away.
    /// Ties go to the highest pid.
    SmallestFootprint,
}

impl VictimPolicy {
    /// Choose the victim on `cycle`. `None` only for an empty cycle.
    pub fn select(self, cycle: &Cycle, snapshot: &LedgerSnapshot) -> Option<Pid> {
        match self {
            Self::HighestPid => cycle.highest_pid(),
            Self::SmallestFootprint => cycle.members().iter().copied().min_by(|a, b| {
                let held = |pid: Pid| snapshot.allocation(pid).map_or(0, |units| units.total());
                held(*a).cmp(&held(*b)).then(b.cmp(a))
            }),
        }
    }
}

impl fmt::Display for VictimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighestPid => write!(f, "highest-pid"),
            Self::SmallestFootprint => write!(f, "smallest-footprint"),
        }
    }
}

impl FromStr for VictimPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highest-pid" => Ok(Self::HighestPid),
            "smallest-footprint" => Ok(Self::SmallestFootprint),
            other => Err(format!(
                "unknown victim policy '{other}' (expected highest-pid or smallest-footprint)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::ParticipantState,
        types::ResourceVector,
        wait_for::{WaitForEdge, WaitForGraph},
    };

    fn ring() -> Cycle {
        let edges = [(0, 1), (1, 2), (2, 0)]
            .map(|(waiter, holder)| WaitForEdge { waiter: Pid(waiter), holder: Pid(holder) });
        WaitForGraph::from_edges(edges).find_cycle().unwrap()
    }

    fn snapshot(held: [[u32; 2]; 3]) -> LedgerSnapshot {
        LedgerSnapshot {
            total: [4, 4].into(),
            available: [0, 0].into(),
            allocation: held.iter().map(|row| ResourceVector::from(*row)).collect(),
            states: vec![ParticipantState::Blocked; 3],
            blocked: Vec::new(),
        }
    }

    #[test]
    fn default_policy_is_highest_pid() {
        assert_eq!(VictimPolicy::default(), VictimPolicy::HighestPid);
        assert_eq!(VictimPolicy::default().select(&ring(), &snapshot([[1, 0]; 3])), Some(Pid(2)));
    }

    #[test]
    fn smallest_footprint_prefers_lightest_holder() {
        let snapshot = snapshot([[1, 0], [2, 2], [3, 0]]);
        assert_eq!(VictimPolicy::SmallestFootprint.select(&ring(), &snapshot), Some(Pid(0)));
    }

    #[test]
    fn smallest_footprint_breaks_ties_toward_highest_pid() {
        let snapshot = snapshot([[1, 0], [0, 1], [3, 0]]);
        assert_eq!(VictimPolicy::SmallestFootprint.select(&ring(), &snapshot), Some(Pid(1)));
    }

    #[test]
    fn parses_its_display_form() {
        for policy in [VictimPolicy::HighestPid, VictimPolicy::SmallestFootprint] {
            assert_eq!(policy.to_string().parse::<VictimPolicy>(), Ok(policy));
        }
        assert!("oldest".parse::<VictimPolicy>().is_err());
    }
}

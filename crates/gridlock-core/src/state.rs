//! Resource ledger: totals, availability, allocations and declared claims.
//!
//! # Invariants
//!
//! - Conservation: for every resource r,
//!   `available[r] + sum_i allocation[i][r] == total[r]`
//! - Claims: with declared claims, `allocation[i][r] <= max_claim[i][r]`
//!
//! Every mutator validates its input first and leaves the state untouched
//! when it refuses, so a refused operation can never break an invariant.

use crate::{
    error::{EngineError, MalformedReason},
    types::{Pid, ResourceVector},
};

/// Units per resource type and per participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    total: ResourceVector,
    available: ResourceVector,
    allocation: Vec<ResourceVector>,
    /// Declared upper bounds, only present for avoidance.
    max_claim: Option<Vec<ResourceVector>>,
}

impl ResourceState {
    /// Fresh state with everything available and no declared claims.
    pub fn new(total: ResourceVector, participants: usize) -> Self {
        let resources = total.len();
        Self {
            available: total.clone(),
            total,
            allocation: vec![ResourceVector::zeros(resources); participants],
            max_claim: None,
        }
    }

    /// State with declared claims and an initial allocation.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidScenario` if dimensions disagree, an
    /// allocation exceeds its claim, or allocations exceed the totals.
    pub fn with_claims(
        total: ResourceVector,
        max_claim: Vec<ResourceVector>,
        allocation: Vec<ResourceVector>,
    ) -> Result<Self, EngineError> {
        if max_claim.len() != allocation.len() {
            return Err(EngineError::InvalidScenario(format!(
                "{} claim rows for {} allocation rows",
                max_claim.len(),
                allocation.len()
            )));
        }

        let mut held = ResourceVector::zeros(total.len());
        for (idx, (claim, alloc)) in max_claim.iter().zip(&allocation).enumerate() {
            let pid = Pid(idx);
            if claim.len() != total.len() || alloc.len() != total.len() {
                return Err(EngineError::InvalidScenario(format!(
                    "{pid} rows must cover {} resources",
                    total.len()
                )));
            }
            if let Some((resource, units, limit)) = alloc.first_excess(claim) {
                return Err(EngineError::InvalidScenario(format!(
                    "{pid} holds {units} of {resource} but claims only {limit}"
                )));
            }
            held = held.checked_add(alloc).ok_or_else(|| {
                EngineError::InvalidScenario("allocation overflows unit counter".into())
            })?;
        }

        let available = total.checked_sub(&held).ok_or_else(|| {
            EngineError::InvalidScenario(format!("allocations {held} exceed totals {total}"))
        })?;

        Ok(Self { total, available, allocation, max_claim: Some(max_claim) })
    }

    /// Total units per resource type.
    pub fn total(&self) -> &ResourceVector {
        &self.total
    }

    /// Units currently free per resource type.
    pub fn available(&self) -> &ResourceVector {
        &self.available
    }

    /// Units held by one participant.
    pub fn allocation(&self, pid: Pid) -> Option<&ResourceVector> {
        self.allocation.get(pid.index())
    }

    /// Allocation matrix, one row per participant.
    pub fn allocations(&self) -> &[ResourceVector] {
        &self.allocation
    }

    /// Declared claim of one participant, if claims were declared.
    pub fn max_claim(&self, pid: Pid) -> Option<&ResourceVector> {
        self.max_claim.as_ref().and_then(|claims| claims.get(pid.index()))
    }

    /// Whether claims were declared (avoidance).
    pub fn has_claims(&self) -> bool {
        self.max_claim.is_some()
    }

    /// `max_claim - allocation` for one participant.
    pub fn need(&self, pid: Pid) -> Option<ResourceVector> {
        self.max_claim(pid)?.checked_sub(self.allocation(pid)?)
    }

    /// Number of participants.
    pub fn participants(&self) -> usize {
        self.allocation.len()
    }

    /// Number of resource types.
    pub fn resources(&self) -> usize {
        self.total.len()
    }

    /// Refuses vectors that could never be honored: unknown pid, wrong
    /// length, more than exists, or more than the remaining claim.
    pub(crate) fn validate_request(
        &self,
        pid: Pid,
        request: &ResourceVector,
    ) -> Result<(), EngineError> {
        if pid.index() >= self.participants() {
            return Err(EngineError::malformed(pid, MalformedReason::UnknownParticipant));
        }
        if request.len() != self.resources() {
            return Err(EngineError::malformed(
                pid,
                MalformedReason::DimensionMismatch {
                    expected: self.resources(),
                    actual: request.len(),
                },
            ));
        }
        if let Some((resource, requested, total)) = request.first_excess(&self.total) {
            return Err(EngineError::malformed(
                pid,
                MalformedReason::ExceedsCapacity { resource, requested, total },
            ));
        }
        if let Some(need) = self.need(pid) {
            if let Some((resource, requested, need)) = request.first_excess(&need) {
                return Err(EngineError::malformed(
                    pid,
                    MalformedReason::ExceedsClaim { resource, requested, need },
                ));
            }
        }
        Ok(())
    }

    /// Refuses a request that could not be granted on top of the
    /// participant's own holding even with every other unit free.
    pub(crate) fn validate_attainable(
        &self,
        pid: Pid,
        request: &ResourceVector,
    ) -> Result<(), EngineError> {
        let Some(held) = self.allocation(pid) else {
            return Err(EngineError::malformed(pid, MalformedReason::UnknownParticipant));
        };
        let excess = request.iter().find_map(|(resource, units)| {
            let wanted = units.saturating_add(held.get(resource));
            let total = self.total.get(resource);
            (wanted > total).then_some((resource, wanted, total))
        });
        match excess {
            Some((resource, requested, total)) => Err(EngineError::malformed(
                pid,
                MalformedReason::ExceedsCapacity { resource, requested, total },
            )),
            None => Ok(()),
        }
    }

    /// Move `request` from `available` into the participant's allocation.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MalformedRequest` if the request fails
    /// validation or exceeds what is available. State is unchanged on error.
    pub fn grant(&mut self, pid: Pid, request: &ResourceVector) -> Result<(), EngineError> {
        self.validate_request(pid, request)?;

        let available = self.available.checked_sub(request).ok_or_else(|| {
            let (resource, requested, available) =
                request.first_excess(&self.available).unwrap_or_default();
            EngineError::malformed(
                pid,
                MalformedReason::ExceedsAvailable { resource, requested, available },
            )
        })?;
        let held = self.allocation[pid.index()].checked_add(request).ok_or_else(|| {
            EngineError::InvariantViolation {
                detail: format!("{pid} allocation overflows"),
                dump: format!("{self:#?}"),
            }
        })?;

        self.available = available;
        self.allocation[pid.index()] = held;
        Ok(())
    }

    /// Return `units` from the participant's allocation to `available`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MalformedRequest` if the participant does not
    /// hold that many units. State is unchanged on error.
    pub fn reclaim(&mut self, pid: Pid, units: &ResourceVector) -> Result<(), EngineError> {
        let held = self
            .allocation(pid)
            .ok_or_else(|| EngineError::malformed(pid, MalformedReason::UnknownParticipant))?;
        if units.len() != held.len() {
            return Err(EngineError::malformed(
                pid,
                MalformedReason::DimensionMismatch { expected: held.len(), actual: units.len() },
            ));
        }
        let remaining = held.checked_sub(units).ok_or_else(|| {
            let (resource, released, held) = units.first_excess(held).unwrap_or_default();
            EngineError::malformed(pid, MalformedReason::ExceedsHolding { resource, released, held })
        })?;
        let available =
            self.available.checked_add(units).ok_or_else(|| EngineError::InvariantViolation {
                detail: format!("returning {units} from {pid} overflows availability"),
                dump: format!("{self:#?}"),
            })?;

        self.allocation[pid.index()] = remaining;
        self.available = available;
        Ok(())
    }

    /// Return everything the participant holds. Returns what was reclaimed.
    pub fn reclaim_all(&mut self, pid: Pid) -> Result<ResourceVector, EngineError> {
        let held = self
            .allocation(pid)
            .cloned()
            .ok_or_else(|| EngineError::malformed(pid, MalformedReason::UnknownParticipant))?;
        self.reclaim(pid, &held)?;
        Ok(held)
    }

    /// Verify conservation and claim bounds.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvariantViolation` with a full state dump.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        for (resource, total) in self.total.iter() {
            let held: u64 = self.allocation.iter().map(|row| u64::from(row.get(resource))).sum();
            let accounted = u64::from(self.available.get(resource)) + held;
            if accounted != u64::from(total) {
                return Err(self.violation(format!(
                    "{resource}: available {} + allocated {held} != total {total}",
                    self.available.get(resource)
                )));
            }
        }

        if let Some(claims) = &self.max_claim {
            for (idx, (claim, alloc)) in claims.iter().zip(&self.allocation).enumerate() {
                if let Some((resource, units, limit)) = alloc.first_excess(claim) {
                    return Err(self.violation(format!(
                        "{} holds {units} of {resource} beyond its claim of {limit}",
                        Pid(idx)
                    )));
                }
            }
        }

        Ok(())
    }

    fn violation(&self, detail: String) -> EngineError {
        tracing::error!("invariant violation: {}", detail);
        EngineError::InvariantViolation { detail, dump: format!("{self:#?}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceId;

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

    #[test]
    fn with_claims_derives_available_and_need() {
        let state = textbook();
        assert_eq!(state.available(), &ResourceVector::from([3, 3, 2]));
        assert_eq!(state.need(Pid(0)), Some(ResourceVector::from([7, 4, 3])));
        assert_eq!(state.need(Pid(4)), Some(ResourceVector::from([4, 3, 1])));
        state.check_invariants().unwrap();
    }

    #[test]
    fn with_claims_rejects_over_allocation() {
        let result = ResourceState::with_claims(
            [1].into(),
            vec![[1].into(), [1].into()],
            vec![[1].into(), [1].into()],
        );
        assert!(matches!(result, Err(EngineError::InvalidScenario(_))));
    }

    #[test]
    fn grant_and_reclaim_conserve_units() {
        let mut state = ResourceState::new([2, 1].into(), 2);
        state.grant(Pid(0), &[1, 1].into()).unwrap();
        state.grant(Pid(1), &[1, 0].into()).unwrap();
        assert_eq!(state.available(), &ResourceVector::zeros(2));
        state.check_invariants().unwrap();

        let reclaimed = state.reclaim_all(Pid(0)).unwrap();
        assert_eq!(reclaimed, ResourceVector::from([1, 1]));
        assert_eq!(state.available(), &ResourceVector::from([1, 1]));
        state.check_invariants().unwrap();
    }

    #[test]
    fn grant_beyond_available_leaves_state_untouched() {
        let mut state = ResourceState::new([1].into(), 2);
        state.grant(Pid(0), &[1].into()).unwrap();
        let before = state.clone();

        let err = state.grant(Pid(1), &[1].into()).unwrap_err();
        assert_eq!(
            err.malformed_reason(),
            Some(MalformedReason::ExceedsAvailable {
                resource: ResourceId(0),
                requested: 1,
                available: 0
            })
        );
        assert_eq!(state, before);
    }

    #[test]
    fn reclaim_beyond_holding_is_malformed() {
        let mut state = ResourceState::new([3].into(), 1);
        state.grant(Pid(0), &[1].into()).unwrap();
        let err = state.reclaim(Pid(0), &[2].into()).unwrap_err();
        assert_eq!(
            err.malformed_reason(),
            Some(MalformedReason::ExceedsHolding { resource: ResourceId(0), released: 2, held: 1 })
        );
    }

    #[test]
    fn request_beyond_claim_is_malformed() {
        let mut state = textbook();
        let err = state.grant(Pid(3), &[0, 2, 0].into()).unwrap_err();
        assert!(matches!(err.malformed_reason(), Some(MalformedReason::ExceedsClaim { .. })));
    }

    #[test]
    fn request_beyond_capacity_is_malformed() {
        let mut state = ResourceState::new([1, 1].into(), 1);
        let err = state.grant(Pid(0), &[2, 0].into()).unwrap_err();
        assert!(matches!(err.malformed_reason(), Some(MalformedReason::ExceedsCapacity { .. })));
    }
}

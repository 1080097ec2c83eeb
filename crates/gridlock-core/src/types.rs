//! Identifiers and unit vectors shared by every component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Count of resource units.
pub type Units = u32;

/// Participant identifier (0..N-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(pub usize);

impl Pid {
    /// Create a participant identifier.
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Index into per-participant tables.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Resource type identifier (0..R-1).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ResourceId(pub usize);

impl ResourceId {
    /// Create a resource identifier.
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Index into per-resource vectors.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Units per resource type, one slot per [`ResourceId`].
///
/// Used for totals, availability, allocations, claims, requests and releases.
/// All comparisons are component-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVector(Vec<Units>);

impl ResourceVector {
    /// Wrap a vector of units.
    pub fn new(units: Vec<Units>) -> Self {
        Self(units)
    }

    /// All-zero vector over `resources` resource types.
    pub fn zeros(resources: usize) -> Self {
        Self(vec![0; resources])
    }

    /// Number of resource types.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the vector covers no resource types.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw units.
    pub fn as_slice(&self) -> &[Units] {
        &self.0
    }

    /// Units of one resource, zero when out of range.
    pub fn get(&self, resource: ResourceId) -> Units {
        self.0.get(resource.index()).copied().unwrap_or(0)
    }

    /// `(resource, units)` pairs in resource order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, Units)> + '_ {
        self.0.iter().enumerate().map(|(idx, &units)| (ResourceId(idx), units))
    }

    /// True when every slot is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&units| units == 0)
    }

    /// Sum over all resource types.
    pub fn total(&self) -> u64 {
        self.0.iter().map(|&units| u64::from(units)).sum()
    }

    /// Component-wise `self <= other`. Vectors of different length never fit.
    pub fn fits_within(&self, other: &Self) -> bool {
        self.len() == other.len() && self.0.iter().zip(&other.0).all(|(a, b)| a <= b)
    }

    /// First resource where `self` exceeds `other`, with both amounts.
    pub fn first_excess(&self, other: &Self) -> Option<(ResourceId, Units, Units)> {
        self.iter().find_map(|(resource, units)| {
            let limit = other.get(resource);
            (units > limit).then_some((resource, units, limit))
        })
    }

    /// Resources where `self` asks for more than `available` offers.
    pub fn shortfall<'a>(&'a self, available: &'a Self) -> impl Iterator<Item = ResourceId> + 'a {
        self.iter()
            .filter(move |&(resource, units)| units > 0 && available.get(resource) < units)
            .map(|(resource, _)| resource)
    }

    /// Component-wise sum, `None` on length mismatch or overflow.
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        if self.len() != other.len() {
            return None;
        }
        self.0.iter().zip(&other.0).map(|(a, b)| a.checked_add(*b)).collect::<Option<_>>().map(Self)
    }

    /// Component-wise difference, `None` on length mismatch or underflow.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        if self.len() != other.len() {
            return None;
        }
        self.0.iter().zip(&other.0).map(|(a, b)| a.checked_sub(*b)).collect::<Option<_>>().map(Self)
    }
}

impl From<Vec<Units>> for ResourceVector {
    fn from(units: Vec<Units>) -> Self {
        Self(units)
    }
}

impl<const N: usize> From<[Units; N]> for ResourceVector {
    fn from(units: [Units; N]) -> Self {
        Self(units.to_vec())
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, units) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{units}")?;
        }
        write!(f, "]")
    }
}

/// Formats a list of participants as `[P1, P3, P4]`.
pub(crate) struct PidList<'a>(pub &'a [Pid]);

impl fmt::Display for PidList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, pid) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{pid}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_within_is_component_wise() {
        let request = ResourceVector::from([1, 0, 2]);
        assert!(request.fits_within(&ResourceVector::from([3, 3, 2])));
        assert!(!request.fits_within(&ResourceVector::from([3, 3, 1])));
        assert!(!request.fits_within(&ResourceVector::from([3, 3])));
    }

    #[test]
    fn checked_sub_rejects_underflow() {
        let held = ResourceVector::from([1, 0]);
        assert_eq!(held.checked_sub(&ResourceVector::from([1, 0])), Some(ResourceVector::zeros(2)));
        assert_eq!(held.checked_sub(&ResourceVector::from([0, 1])), None);
    }

    #[test]
    fn shortfall_lists_only_scarce_resources() {
        let request = ResourceVector::from([1, 2, 0]);
        let available = ResourceVector::from([1, 1, 0]);
        let short: Vec<_> = request.shortfall(&available).collect();
        assert_eq!(short, vec![ResourceId(1)]);
    }

    #[test]
    fn first_excess_reports_amounts() {
        let request = ResourceVector::from([0, 4]);
        let limit = ResourceVector::from([1, 3]);
        assert_eq!(request.first_excess(&limit), Some((ResourceId(1), 4, 3)));
        assert_eq!(limit.first_excess(&limit), None);
    }

    #[test]
    fn display_formats() {
        assert_eq!(ResourceVector::from([1, 0, 2]).to_string(), "[1, 0, 2]");
        assert_eq!(Pid(3).to_string(), "P3");
        assert_eq!(ResourceId(0).to_string(), "R0");
        assert_eq!(PidList(&[Pid(1), Pid(3)]).to_string(), "[P1, P3]");
    }
}

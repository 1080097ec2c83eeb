//! Engine error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::{Pid, ResourceId, ResourceVector, Units};

/// Why a request or release was refused before any allocation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MalformedReason {
    /// Request exceeds the participant's remaining declared claim.
    ExceedsClaim {
        /// Offending resource.
        resource: ResourceId,
        /// Units asked for.
        requested: Units,
        /// Units still claimable.
        need: Units,
    },

    /// Request exceeds what is free right now (avoidance walkthrough only,
    /// where nothing ever waits).
    ExceedsAvailable {
        /// Offending resource.
        resource: ResourceId,
        /// Units asked for.
        requested: Units,
        /// Units currently free.
        available: Units,
    },

    /// Request exceeds the total capacity of the system and can never be
    /// satisfied.
    ExceedsCapacity {
        /// Offending resource.
        resource: ResourceId,
        /// Units asked for, plus those already held when blocking is possible.
        requested: Units,
        /// Units in existence.
        total: Units,
    },

    /// Release returns more than the participant holds.
    ExceedsHolding {
        /// Offending resource.
        resource: ResourceId,
        /// Units handed back.
        released: Units,
        /// Units actually held.
        held: Units,
    },

    /// Vector length differs from the number of resource types.
    DimensionMismatch {
        /// Number of resource types.
        expected: usize,
        /// Length of the submitted vector.
        actual: usize,
    },

    /// No participant with this pid exists.
    UnknownParticipant,

    /// Participant has already terminated.
    ParticipantTerminated,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExceedsClaim { resource, requested, need } => {
                write!(f, "requests {requested} of {resource} but may only claim {need} more")
            },
            Self::ExceedsAvailable { resource, requested, available } => {
                write!(f, "requests {requested} of {resource} but only {available} available")
            },
            Self::ExceedsCapacity { resource, requested, total } => {
                write!(f, "requests {requested} of {resource} but only {total} exist")
            },
            Self::ExceedsHolding { resource, released, held } => {
                write!(f, "releases {released} of {resource} but holds {held}")
            },
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "vector has {actual} entries, expected {expected}")
            },
            Self::UnknownParticipant => write!(f, "unknown participant"),
            Self::ParticipantTerminated => write!(f, "participant already terminated"),
        }
    }
}

/// Errors from engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Request or release refused before any allocation decision.
    #[error("malformed request from {pid}: {reason}")]
    MalformedRequest {
        /// Requesting participant.
        pid: Pid,
        /// What was wrong with it.
        reason: MalformedReason,
    },

    /// Granting would leave the system without a safe sequence.
    #[error("unsafe request from {pid} for {request}: no safe sequence would remain")]
    UnsafeRequest {
        /// Requesting participant.
        pid: Pid,
        /// Denied request.
        request: ResourceVector,
    },

    /// Internal bookkeeping is corrupt. The run must stop.
    #[error("invariant violation: {detail}\nstate dump:\n{dump}")]
    InvariantViolation {
        /// Which invariant broke.
        detail: String,
        /// Full state at the time of detection.
        dump: String,
    },

    /// Scenario input is inconsistent (dimensions, claims, allocations).
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
}

impl EngineError {
    pub(crate) const fn malformed(pid: Pid, reason: MalformedReason) -> Self {
        Self::MalformedRequest { pid, reason }
    }

    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors indicate corrupted state; the run must abort.
    /// Malformed and unsafe requests are refused locally and the requesting
    /// participant carries on with its script.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvariantViolation { .. } => true,

            Self::MalformedRequest { .. } | Self::UnsafeRequest { .. } | Self::InvalidScenario(_) => {
                false
            },
        }
    }

    /// Malformed reason, if this is a malformed request.
    pub fn malformed_reason(&self) -> Option<MalformedReason> {
        match self {
            Self::MalformedRequest { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

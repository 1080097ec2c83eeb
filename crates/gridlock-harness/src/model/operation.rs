//! Operations for model-based testing.
//!
//! Operations cover every ledger entry point a driver can call. They are
//! generated randomly by proptest (or `arbitrary` in the fuzzer) and applied
//! to both the model and the real ledger.

use arbitrary::Arbitrary;
use gridlock_core::ResourceVector;

/// Participant identifier (u8 keeps the test space small).
pub type ParticipantId = u8;

/// Resource types in every model world.
pub const RESOURCES: usize = 2;

/// Small fixed-width resource vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct ModelVector(pub [u8; RESOURCES]);

impl ModelVector {
    /// Convert to the real vector type.
    pub fn to_resource_vector(self) -> ResourceVector {
        ResourceVector::new(self.0.iter().map(|&units| u32::from(units)).collect())
    }
}

/// Operations that can be applied to the ledger.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Participant asks for units.
    Request {
        /// Requesting participant.
        pid: ParticipantId,
        /// Units asked for.
        units: ModelVector,
    },

    /// Participant hands units back.
    Release {
        /// Releasing participant.
        pid: ParticipantId,
        /// Units handed back.
        units: ModelVector,
    },

    /// Participant reaches the end of its script.
    Finish {
        /// Finishing participant.
        pid: ParticipantId,
    },

    /// Monitor terminates a victim.
    Terminate {
        /// Victim.
        pid: ParticipantId,
    },

    /// Participant passes a cooperative checkpoint.
    Checkpoint {
        /// Checking participant.
        pid: ParticipantId,
    },

    /// Monitor raises the stop signal.
    Halt,
}

/// Result of applying an operation.
///
/// Used to compare model and real system behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed with expected error.
    Error(OperationError),
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// No such participant.
    UnknownParticipant,

    /// Participant has already terminated.
    Terminated,

    /// Request beyond capacity or release beyond holdings.
    Malformed,

    /// Blocked participant tried to act. The real ledger reports this as an
    /// invariant violation.
    WhileBlocked,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, OperationResult::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

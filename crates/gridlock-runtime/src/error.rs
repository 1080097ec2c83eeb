//! Run error types.

use gridlock_core::EngineError;
use thiserror::Error;

/// Errors that can abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Engine refused the scenario or its bookkeeping broke.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A participant or monitor task panicked or was cancelled.
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Writing the trace failed.
    #[error("trace export failed: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the trace failed.
    #[error("trace encoding failed: {0}")]
    Encode(String),
}

impl RunError {
    /// Returns true if the run's results cannot be trusted.
    ///
    /// Export failures happen after the run completed; the trace itself is
    /// still valid.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Engine(err) => err.is_fatal(),
            Self::Join(_) => true,
            Self::Io(_) | Self::Encode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_scenario_is_not_fatal() {
        let err = RunError::from(EngineError::InvalidScenario("no participants".into()));
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "engine error: invalid scenario: no participants");
    }

    #[test]
    fn invariant_violation_is_fatal() {
        let err = RunError::from(EngineError::InvariantViolation {
            detail: "R0 leaked".into(),
            dump: String::new(),
        });
        assert!(err.is_fatal());
    }
}

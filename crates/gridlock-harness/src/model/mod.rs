//! Reference model for model-based testing.
//!
//! The model is a deliberately naive blocking ledger: plain vectors, a
//! linear wait queue and no shared code with `gridlock-core`. It is the
//! oracle against which the real [`Ledger`](gridlock_core::Ledger) is
//! verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Independence: Nothing here calls into the real ledger
//! - Deterministic: Same inputs produce same outputs

pub mod operation;
mod world;

pub use operation::{
    ModelVector, Operation, OperationError, OperationResult, ParticipantId, RESOURCES,
};
pub use world::{ModelWorld, ObservableState};

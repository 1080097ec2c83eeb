//! Deterministic simulation harness for Gridlock.
//!
//! Turmoil-based [`Environment`](gridlock_core::Environment) implementation
//! and seeded scenario generation for reproducible concurrent runs: virtual
//! time replaces the wall clock, and a ChaCha RNG replaces OS entropy.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of the blocking
//! ledger. Operations are applied to both the model and the real
//! [`Ledger`](gridlock_core::Ledger), and their observable states are
//! compared.
//!
//! # Example
//!
//! ```rust,ignore
//! use gridlock_harness::SimEnv;
//! use gridlock_core::Scenario;
//!
//! let mut sim = turmoil::Builder::new().rng_seed(7).build();
//! sim.client("run", async {
//!     let config = gridlock_runtime::EngineConfig::default();
//!     let trace = gridlock_runtime::run_resolution(
//!         &Scenario::circular_wait(),
//!         SimEnv::with_seed(7),
//!         &config,
//!     )
//!     .await?;
//!     assert_eq!(trace.victims().len(), 1);
//!     Ok(())
//! });
//! sim.run().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod generator;
pub mod model;
pub mod sim_env;

pub use generator::{ScenarioGenerator, ring_with_tail};
pub use model::{
    ModelVector, ModelWorld, ObservableState, Operation, OperationError, OperationResult,
    ParticipantId, RESOURCES,
};
pub use sim_env::SimEnv;

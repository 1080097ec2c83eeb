//! Gridlock core: Sans-IO deadlock avoidance, detection and recovery.
//!
//! Everything here is synchronous and deterministic. Concurrency, clocks and
//! task scheduling live in `gridlock-runtime` (real time) and
//! `gridlock-harness` (simulated time); both drive the same [`Ledger`].
//!
//! ## Architecture
//!
//! ```text
//! gridlock-core
//!   ├─ ResourceState   (totals, availability, allocation, claims)
//!   ├─ banker          (safety check, request evaluation)
//!   ├─ Ledger          (request arbiter, returns LedgerActions)
//!   ├─ WaitForGraph    (derived from a LedgerSnapshot, cycle detection)
//!   ├─ VictimPolicy    (who gets terminated)
//!   ├─ Scenario        (topology and scripts)
//!   └─ Trace           (observable output)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod avoidance;
pub mod banker;
pub mod env;
pub mod error;
pub mod ledger;
pub mod mode;
pub mod scenario;
pub mod state;
pub mod trace;
pub mod types;
pub mod victim;
pub mod wait_for;

pub use avoidance::run_avoidance;
pub use banker::{Decision, evaluate_request, is_safe, safe_sequence};
pub use env::Environment;
pub use error::{EngineError, MalformedReason};
pub use ledger::{
    Arbitration, BlockedRequest, Checkpoint, Ledger, LedgerAction, LedgerSnapshot,
    ParticipantState, RequestOutcome, Termination,
};
pub use mode::{Mode, ModeKind};
pub use scenario::{AvoidanceScenario, AvoidanceStep, ParticipantScript, Scenario, Step};
pub use state::ResourceState;
pub use trace::{Trace, TraceEntry, TraceEvent, Verdict};
pub use types::{Pid, ResourceId, ResourceVector, Units};
pub use victim::VictimPolicy;
pub use wait_for::{Cycle, WaitForEdge, WaitForGraph, build_wait_for_graph, find_cycle};

//! Environment abstraction for deterministic runs.
//!
//! Drivers never touch the system clock or entropy directly. They go through
//! an [`Environment`], so the same engine runs against real time in the CLI
//! and against turmoil's virtual clock with a seeded RNG in tests.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Time, randomness and sleeping for engine drivers.
///
/// Ledger logic never calls this; only the code that schedules participants
/// and the monitor does.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time. Never decreases.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Simulation implementations draw from a seeded RNG and must produce the
    /// same bytes for the same seed.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Uniform-ish duration in `0..=max`, millisecond resolution.
    ///
    /// Used to perturb participant think time. Zero `max` never consumes
    /// randomness, which keeps unjittered simulated runs identical across
    /// RNG implementations.
    fn jitter(&self, max: Duration) -> Duration {
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let span = max_ms.saturating_add(1);
        Duration::from_millis(self.random_u64() % span)
    }
}

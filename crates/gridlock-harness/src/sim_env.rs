//! Simulated environment backed by turmoil's virtual clock.
//!
//! Inside a turmoil host the Tokio clock is paused and advanced by the
//! simulation, so `tokio::time::Instant` and `tokio::time::sleep` both run on
//! virtual time. Randomness comes from a seeded ChaCha8 RNG shared by every
//! clone, so one seed fixes the whole run.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use gridlock_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic [`Environment`] for simulated runs.
///
/// Must be used from inside a turmoil host or client (or any Tokio runtime
/// with a paused clock) for time to be virtual.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment seeded with zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment whose randomness is fixed by `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

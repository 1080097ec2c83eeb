//! Real-time Environment implementation.
//!
//! `SystemEnv` backs the CLI: std clock, tokio timers and OS randomness
//! (only used for think-time jitter).

use std::time::Duration;

use gridlock_core::env::Environment;

/// Environment using system time and OS entropy.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Jitter only; a zeroed buffer means no extra think time.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}

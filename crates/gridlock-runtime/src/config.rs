//! Engine timing and policy configuration.

use std::time::Duration;

use gridlock_core::VictimPolicy;

/// Knobs for concurrent runs. None of them affect correctness, only how
/// quickly a deadlock is noticed and how the participants interleave.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Monitor polling period when no blocking event wakes it earlier.
    pub poll_interval: Duration,
    /// Pause after each scripted step.
    pub think_time: Duration,
    /// Upper bound of random extra think time.
    pub think_jitter: Duration,
    /// How long a blocked participant waits before re-checking for a stop or
    /// termination it was not woken for.
    pub recheck_interval: Duration,
    /// The run is halted once this much time has passed.
    pub deadline: Duration,
    /// Victim selection in resolution mode.
    pub victim_policy: VictimPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            think_time: Duration::from_millis(150),
            think_jitter: Duration::ZERO,
            recheck_interval: Duration::from_millis(50),
            deadline: Duration::from_secs(10),
            victim_policy: VictimPolicy::HighestPid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(config.think_time, Duration::from_millis(150));
        assert_eq!(config.victim_policy, VictimPolicy::HighestPid);
        assert!(config.recheck_interval < config.poll_interval);
    }
}

//! Fixed-interval retry for reconnection
//!
//! The agent runs unattended and must outlive any server outage, so the
//! delay never grows and there is no attempt limit.

use std::time::Duration;

use ks_core::AgentConfig;

/// Retry policy with a constant delay between attempts
#[derive(Debug, Clone)]
pub struct FixedInterval {
    /// Delay between attempts
    interval: Duration,
    /// Attempts made since the last reset
    attempts: u64,
}

impl FixedInterval {
    /// Create a policy with the given delay
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            attempts: 0,
        }
    }

    /// Create a policy from configuration
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.retry_interval)
    }

    /// Get the next delay and count the attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.interval
    }

    /// Failed attempts since the last reset
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Reset the attempt counter after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

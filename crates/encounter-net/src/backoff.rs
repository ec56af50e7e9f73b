//! Exponential reconnect backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Reconnect pacing.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay after the first failure. Default: 1 s.
    pub initial_delay: Duration,
    /// Growth factor per consecutive failure. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Upper bound on the delay. Default: 30 s.
    pub max_delay: Duration,
    /// Attempts before [`connect_with_retry`](crate::TcpWorldClient::connect_with_retry)
    /// gives up. Default: 5.
    pub max_attempts: u32,
    /// Jitter factor in `[0, 1]`, applied as ±jitter. Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: 0.25,
        }
    }
}

/// Consecutive-failure counter producing the next cool-down.
#[derive(Debug)]
pub struct Backoff {
    config: ReconnectConfig,
    failures: u32,
    current_delay: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            failures: 0,
            current_delay,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current_delay;
        self.failures = self.failures.saturating_add(1);

        let jittered = if self.config.jitter > 0.0 {
            let jitter = self.config.jitter.min(1.0);
            base.mul_f64(rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter)))
        } else {
            base
        };

        self.current_delay = base
            .mul_f64(self.config.backoff_multiplier.max(1.0))
            .min(self.config.max_delay);

        jittered.min(self.config.max_delay)
    }

    /// Forget past failures after a successful connect.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.current_delay = self.config.initial_delay;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }
}

/// Errors produced by the retrying connect.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    #[error("world service unreachable after {0} attempts")]
    MaxAttemptsExhausted(u32),
}

//! Delay strategies between pin attempts.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackoffConfig, PinningConfig};

/// How long to wait after a failed attempt before the next one.
///
/// `attempt` is the 1-based number of the attempt that just failed.
pub trait Backoff: Send + Sync + Debug {
    fn delay(&self, attempt: u32) -> Duration;
}

/// `base * attempt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    pub base: Duration,
}

impl Backoff for LinearBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt)
    }
}

/// `min(base * factor^(attempt - 1), max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(multiplier).min(self.max)
    }
}

/// Build the strategy selected in configuration.
pub fn from_config(config: &PinningConfig) -> Arc<dyn Backoff> {
    match &config.backoff {
        BackoffConfig::Linear => Arc::new(LinearBackoff {
            base: config.retry_delay,
        }),
        BackoffConfig::Exponential { factor, max_delay } => Arc::new(ExponentialBackoff {
            base: config.retry_delay,
            factor: *factor,
            max: *max_delay,
        }),
    }
}

//! Bounded exponential backoff for reconnection attempts
//!
//! ```text
//! delay(n) = min(initial * multiplier^n, max)
//!
//! initial 500ms, multiplier 2, max 30s:
//!   0.5s, 1s, 2s, 4s, 8s, 16s, 30s, 30s, ...
//! ```
//!
//! Reconnection never gives up; the attempt counter only drives the delay.

use std::time::Duration;

use crate::config::PipelineConfig;

/// Exponential backoff schedule with a ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Policy using the configured reconnection bounds
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            initial: config.reconnect_initial,
            max: config.reconnect_max,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let millis = self.initial.as_millis() as f64 * factor;
        let capped = millis.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

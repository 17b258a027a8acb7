use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ModelError, TimeoutMs};

/// Polling schedule used while waiting for a freshly launched runner to fork its listener.
///
/// Delays grow geometrically from `first_ms` by `factor`, are capped at `max_ms`,
/// and stop once their sum reaches `timeout_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleStrategy {
    pub first_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
    pub timeout_ms: TimeoutMs,
}

impl SettleStrategy {
    /// A single sleep of `ms`, then one lookup.
    pub fn fixed(ms: u64) -> Self {
        Self {
            first_ms: ms,
            max_ms: ms,
            factor: 1.0,
            timeout_ms: ms,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(ModelError::InvalidSettle(format!(
                "factor must be >= 1.0, got {}",
                self.factor
            )));
        }
        if self.max_ms < self.first_ms {
            return Err(ModelError::InvalidSettle(format!(
                "max_ms ({}) is below first_ms ({})",
                self.max_ms, self.first_ms
            )));
        }
        Ok(())
    }

    /// The sleeps to perform, in order. Each is followed by one lookup.
    pub fn delays(&self) -> SettleDelays {
        SettleDelays {
            next_ms: self.first_ms.max(1),
            max_ms: self.max_ms.max(1),
            factor: if self.factor.is_finite() {
                self.factor.max(1.0)
            } else {
                1.0
            },
            remaining_ms: self.timeout_ms,
        }
    }
}

impl Default for SettleStrategy {
    fn default() -> Self {
        Self {
            first_ms: 250,
            max_ms: 2_000,
            factor: 2.0,
            timeout_ms: 10_000,
        }
    }
}

/// Iterator returned by [`SettleStrategy::delays`].
#[derive(Debug, Clone)]
pub struct SettleDelays {
    next_ms: u64,
    max_ms: u64,
    factor: f64,
    remaining_ms: u64,
}

impl Iterator for SettleDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining_ms == 0 {
            return None;
        }
        let step = self.next_ms.min(self.max_ms).min(self.remaining_ms);
        self.remaining_ms -= step;
        self.next_ms = ((self.next_ms as f64) * self.factor).min(self.max_ms as f64) as u64;
        Some(Duration::from_millis(step))
    }
}

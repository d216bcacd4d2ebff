//! Controller configuration.

use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;

/// Resubscribe backoff policy.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first resubscribe attempt.
    /// Default: 500ms
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay.
    /// Default: 30s
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    /// Default: 2.0
    pub multiplier: f64,

    /// Consecutive failed attempts before giving up and flagging the view as failed.
    /// Default: 8
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: 8,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = (self.initial_delay_ms as f64) * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }
}

/// Configuration for a [`LiveCollectionController`](crate::LiveCollectionController).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub backoff: BackoffConfig,

    /// Serialize writes that target the same record id.
    /// Default: true
    pub serialize_same_id: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            serialize_same_id: true,
        }
    }
}

impl ControllerConfig {
    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

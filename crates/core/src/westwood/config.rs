//! Westwood+LP tunables and constants.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::time::HZ;

/// Shortest bandwidth sampling window (50 ms).
pub(crate) const RTT_MIN_WINDOW: u32 = HZ / 20;

/// Conservative RTT assumed before the first sample (20 s).
pub(crate) const INIT_RTT: u32 = 20 * HZ;

/// Delay averages at or below this value have never been updated.
pub(crate) const DELAY_UNSET: u32 = 1;

/// Tunables for Westwood+LP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WestwoodConfig {
    /// Early window reduction aggressiveness: packets of queue tolerated at full
    /// threshold, before the delay terms scale it down.
    pub beta: u32,
}

impl Default for WestwoodConfig {
    fn default() -> Self {
        Self { beta: 3 }
    }
}

impl WestwoodConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.beta > 100 {
            return Err(ConfigError::InvalidTunable {
                name: "westwood.beta",
                value: self.beta,
                reason: "must be within 0..=100",
            });
        }
        Ok(())
    }
}

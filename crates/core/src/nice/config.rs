//! TCP Nice tunables and constants.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Fractional window denominator meaning "not pacing": one full window of two
/// segments per round.
pub(crate) const UNIT_FRACTION: u32 = 2;

/// Fewer RTT samples than this in a round means we are almost certainly only
/// seeing delayed ACKs, so the round is not used for a delay decision.
pub(crate) const MIN_ROUND_SAMPLES: u32 = 3;

/// Tunables for TCP Nice.
///
/// Shared read-only by every connection running the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NiceConfig {
    /// Lower bound of packets queued in the network.
    pub alpha: u32,
    /// Upper bound of packets queued in the network.
    pub beta: u32,
    /// Queued packets above which slow start is left.
    pub gamma: u32,
    /// Percentage of cwnd that must see congestion before a multiplicative decrease.
    pub fraction: u32,
    /// Delay threshold of the per-sample congestion detector, in percent of the
    /// way from base RTT to max RTT.
    pub threshold: u32,
    /// Largest permitted fractional window denominator.
    pub max_fwnd: u32,
}

impl Default for NiceConfig {
    fn default() -> Self {
        Self {
            alpha: 1,
            beta: 3,
            gamma: 1,
            fraction: 50,
            threshold: 20,
            max_fwnd: 96,
        }
    }
}

impl NiceConfig {
    /// Divisor applied to cwnd to get the congestion count that triggers a
    /// multiplicative decrease.
    pub fn fraction_divisor(&self) -> u32 {
        (100 / self.fraction.max(1)).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fraction == 0 || self.fraction > 100 {
            return Err(ConfigError::InvalidTunable {
                name: "nice.fraction",
                value: self.fraction,
                reason: "must be within 1..=100",
            });
        }
        if self.threshold > 100 {
            return Err(ConfigError::InvalidTunable {
                name: "nice.threshold",
                value: self.threshold,
                reason: "must be a percentage (0..=100)",
            });
        }
        if self.alpha > self.beta {
            return Err(ConfigError::InvalidTunable {
                name: "nice.alpha",
                value: self.alpha,
                reason: "must not exceed beta",
            });
        }
        if self.max_fwnd < UNIT_FRACTION {
            return Err(ConfigError::InvalidTunable {
                name: "nice.max_fwnd",
                value: self.max_fwnd,
                reason: "must be at least 2",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config() {
        let config = NiceConfig::default();
        assert_eq!(config.fraction_divisor(), 2);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::zero_fraction(NiceConfig { fraction: 0, ..Default::default() }, "nice.fraction")]
    #[case::fraction_over_100(NiceConfig { fraction: 101, ..Default::default() }, "nice.fraction")]
    #[case::threshold_over_100(NiceConfig { threshold: 150, ..Default::default() }, "nice.threshold")]
    #[case::alpha_above_beta(NiceConfig { alpha: 5, beta: 3, ..Default::default() }, "nice.alpha")]
    #[case::tiny_max_fwnd(NiceConfig { max_fwnd: 1, ..Default::default() }, "nice.max_fwnd")]
    fn test_invalid_tunables_rejected(#[case] config: NiceConfig, #[case] expected: &str) {
        match config.validate() {
            Err(ConfigError::InvalidTunable { name, .. }) => assert_eq!(name, expected),
            other => panic!("expected InvalidTunable for {expected}, got {other:?}"),
        }
    }

    #[rstest]
    #[case(100, 1)]
    #[case(50, 2)]
    #[case(25, 4)]
    #[case(30, 3)]
    fn test_fraction_divisor(#[case] fraction: u32, #[case] divisor: u32) {
        let config = NiceConfig {
            fraction,
            ..Default::default()
        };
        assert_eq!(config.fraction_divisor(), divisor);
    }
}

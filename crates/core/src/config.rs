//! Engine selection and tunables.
//!
//! The configuration is read once, validated and then shared read-only by every
//! controller built from it.
//!
//! ```toml
//! algorithm = "nice"
//!
//! [nice]
//! alpha = 1
//! beta = 3
//! fraction = 50
//!
//! [westwood]
//! beta = 3
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::congestion_control::{CongestionControlAlgorithm, CongestionController};
use crate::errors::ConfigError;
use crate::nice::{NiceConfig, NiceController};
use crate::time::{RealTime, TimeSource};
use crate::westwood::{WestwoodConfig, WestwoodController};

/// Configuration for creating congestion controllers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionControlConfig {
    /// Which algorithm to use.
    pub algorithm: CongestionControlAlgorithm,
    /// TCP Nice tunables.
    pub nice: Arc<NiceConfig>,
    /// Westwood+LP tunables.
    pub westwood: Arc<WestwoodConfig>,
}

impl CongestionControlConfig {
    /// Create a new configuration for the specified algorithm with defaults.
    pub fn new(algorithm: CongestionControlAlgorithm) -> Self {
        Self {
            algorithm,
            ..Default::default()
        }
    }

    /// Create a configuration from an existing NiceConfig.
    pub fn from_nice_config(config: NiceConfig) -> Self {
        Self {
            algorithm: CongestionControlAlgorithm::Nice,
            nice: Arc::new(config),
            ..Default::default()
        }
    }

    /// Create a configuration from an existing WestwoodConfig.
    pub fn from_westwood_config(config: WestwoodConfig) -> Self {
        Self {
            algorithm: CongestionControlAlgorithm::WestwoodLp,
            westwood: Arc::new(config),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!(path = ?path, "Reading congestion control configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check every tunable, including those of the algorithms not selected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.nice.validate()?;
        self.westwood.validate()?;
        Ok(())
    }

    /// Build a congestion controller from this configuration.
    pub fn build(&self) -> CongestionController<RealTime> {
        self.build_with_time_source(RealTime::new())
    }

    /// Build a congestion controller with a custom time source.
    ///
    /// This is useful for deterministic testing with virtual time.
    pub fn build_with_time_source<T: TimeSource>(&self, time_source: T) -> CongestionController<T> {
        tracing::trace!(algorithm = %self.algorithm, "Building congestion controller");
        match self.algorithm {
            CongestionControlAlgorithm::Nice => {
                CongestionController::Nice(NiceController::new(Arc::clone(&self.nice)))
            }
            CongestionControlAlgorithm::WestwoodLp => CongestionController::WestwoodLp(
                WestwoodController::new_with_time_source(Arc::clone(&self.westwood), time_source),
            ),
        }
    }
}

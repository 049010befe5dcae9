use thiserror::Error;

/// Errors raised while loading or validating congestion control configuration.
///
/// The engines themselves never fail: every event has a defined response.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid tunable {name} = {value}: {reason}")]
    InvalidTunable {
        name: &'static str,
        value: u32,
        reason: &'static str,
    },

    #[error("unknown congestion control algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

use thiserror::Error;

/// Configuration errors raised when building gates, smoothers and gradients
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Tick interval must be positive and finite, got {0}")]
    InvalidTickInterval(f64),

    #[error("Decay factor must be in (0, 1], got {0}")]
    InvalidDecayFactor(f64),

    #[error("Gradient thresholds must be strictly increasing: {0}")]
    UnorderedThresholds(String),

    #[error("Invalid gate threshold: {0}")]
    InvalidGateThreshold(String),

    #[error("Stale speed cutoff must be finite and non-negative, got {0}")]
    InvalidStaleSpeedCutoff(f64),

    #[error("Kalman noise must be positive and finite: {0}")]
    InvalidNoise(String),

    #[error("Line width must be positive, got {0}")]
    InvalidLineWidth(f64),

    #[error("Failed to load config: {0}")]
    Load(String),
}

/// Result type for fallible construction
pub type ConfigResult<T> = Result<T, ConfigError>;

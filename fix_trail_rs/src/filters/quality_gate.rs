use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Fix, Timestamp};

/// Fixes older than this are dropped (seconds)
pub const DEFAULT_MAX_AGE_SECS: f64 = 10.0;
/// Fixes with a larger accuracy radius are dropped (meters)
pub const DEFAULT_MAX_HORIZONTAL_ACCURACY_M: f64 = 50.0;

/// Outcome of checking one raw fix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Accepted,
    RejectedStale,
    RejectedInvalidAccuracy,
    RejectedLowAccuracy,
}

impl GateDecision {
    pub fn is_accepted(self) -> bool {
        self == GateDecision::Accepted
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            GateDecision::Accepted => "location quality is good enough",
            GateDecision::RejectedStale => "location is old",
            GateDecision::RejectedInvalidAccuracy => "latitude and longitude values are invalid",
            GateDecision::RejectedLowAccuracy => "accuracy is too low",
        };
        f.write_str(reason)
    }
}

/// Stateless fix-quality predicate
///
/// Rules run in order and the first match wins: staleness, invalid accuracy
/// sentinel, then accuracy radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityGate {
    max_age: f64,
    max_horizontal_accuracy: f64,
}

impl QualityGate {
    pub fn new(max_age: f64, max_horizontal_accuracy: f64) -> ConfigResult<Self> {
        if !(max_age.is_finite() && max_age >= 0.0) {
            return Err(ConfigError::InvalidGateThreshold(format!(
                "max age {} s",
                max_age
            )));
        }
        if !(max_horizontal_accuracy.is_finite() && max_horizontal_accuracy >= 0.0) {
            return Err(ConfigError::InvalidGateThreshold(format!(
                "max horizontal accuracy {} m",
                max_horizontal_accuracy
            )));
        }
        Ok(Self {
            max_age,
            max_horizontal_accuracy,
        })
    }

    pub fn accept(&self, fix: &Fix, now: Timestamp) -> GateDecision {
        // NaN age (unknown timestamp) counts as stale
        if !(fix.age(now) <= self.max_age) {
            return GateDecision::RejectedStale;
        }
        if !fix.has_valid_accuracy() {
            return GateDecision::RejectedInvalidAccuracy;
        }
        if fix.horizontal_accuracy > self.max_horizontal_accuracy {
            return GateDecision::RejectedLowAccuracy;
        }
        GateDecision::Accepted
    }

    pub fn max_age(&self) -> f64 {
        self.max_age
    }

    pub fn max_horizontal_accuracy(&self) -> f64 {
        self.max_horizontal_accuracy
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE_SECS,
            max_horizontal_accuracy: DEFAULT_MAX_HORIZONTAL_ACCURACY_M,
        }
    }
}

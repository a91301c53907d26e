use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the UNIX epoch. Differences between two timestamps are seconds.
pub type Timestamp = f64;

/// WGS84 position carried through the pipeline untouched
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One location sample as delivered by the location source
///
/// Negative `horizontal_accuracy` marks an invalid measurement and negative
/// `speed` marks an unknown speed, following the platform conventions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub coordinate: Coordinate,
    pub horizontal_accuracy: f64,
    pub speed: f64,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default = "unknown")]
    pub vertical_accuracy: f64,
    #[serde(default = "unknown")]
    pub course: f64,
    #[serde(default = "unknown")]
    pub speed_accuracy: f64,
}

fn unknown() -> f64 {
    -1.0
}

impl Fix {
    pub fn new(
        coordinate: Coordinate,
        horizontal_accuracy: f64,
        speed: f64,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            coordinate,
            horizontal_accuracy,
            speed,
            timestamp,
            altitude: 0.0,
            vertical_accuracy: unknown(),
            course: unknown(),
            speed_accuracy: unknown(),
        }
    }

    /// Age of the fix relative to `now`, in seconds
    pub fn age(&self, now: Timestamp) -> f64 {
        now - self.timestamp
    }

    /// Negative (the platform's "invalid" sentinel) and non-finite accuracies are invalid
    pub fn has_valid_accuracy(&self) -> bool {
        self.horizontal_accuracy.is_finite() && self.horizontal_accuracy >= 0.0
    }

    /// Copy of this fix with speed and timestamp replaced by filter output
    pub fn with_speed(&self, speed: f64, timestamp: Timestamp) -> Self {
        Self {
            speed,
            timestamp,
            ..self.clone()
        }
    }
}

pub fn current_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

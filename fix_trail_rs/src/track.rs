use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::gradient::MS_TO_KMH;
use crate::types::{Coordinate, Fix};

/// Smallest accuracy circle drawn around the current position (meters)
pub const MIN_MARKER_RADIUS_M: f64 = 50.0;

/// Which retained sequence the renderer draws
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    #[default]
    Raw,
    Filtered,
    External,
}

/// Fix histories retained for drawing
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FixTrack {
    raw: Vec<Fix>,
    filtered: Vec<Fix>,
    external: Vec<Fix>,
}

impl FixTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_raw(&mut self, fix: Fix) {
        self.raw.push(fix);
    }

    pub fn push_filtered(&mut self, fix: Fix) {
        self.filtered.push(fix);
    }

    pub fn push_external(&mut self, fix: Fix) {
        self.external.push(fix);
    }

    pub fn raw(&self) -> &[Fix] {
        &self.raw
    }

    pub fn filtered(&self) -> &[Fix] {
        &self.filtered
    }

    pub fn external(&self) -> &[Fix] {
        &self.external
    }

    pub fn get(&self, source: TrackSource) -> &[Fix] {
        match source {
            TrackSource::Raw => &self.raw,
            TrackSource::Filtered => &self.filtered,
            TrackSource::External => &self.external,
        }
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.filtered.clear();
        self.external.clear();
    }
}

/// Current-position marker with its accuracy circle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub coordinate: Coordinate,
    pub radius: f64,
}

impl Marker {
    pub fn for_fix(fix: &Fix) -> Self {
        Self {
            coordinate: fix.coordinate,
            radius: accuracy_radius(fix.horizontal_accuracy),
        }
    }
}

/// Circle radius for an accuracy value; invalid or small values get the minimum
pub fn accuracy_radius(horizontal_accuracy: f64) -> f64 {
    if horizontal_accuracy > MIN_MARKER_RADIUS_M {
        horizontal_accuracy
    } else {
        MIN_MARKER_RADIUS_M
    }
}

/// Speed label; unknown or non-positive speed reads as 0
pub fn display_speed_kmh(speed: f64) -> String {
    if speed > 0.0 {
        format!("{:.2} km/h", speed * MS_TO_KMH)
    } else {
        "0 km/h".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(accuracy: f64) -> Fix {
        Fix::new(Coordinate::new(41.887, -87.622), accuracy, 1.0, 0.0)
    }

    #[test]
    fn test_marker_radius() {
        assert_eq!(Marker::for_fix(&fix(-1.0)).radius, 50.0);
        assert_eq!(Marker::for_fix(&fix(12.0)).radius, 50.0);
        assert_eq!(Marker::for_fix(&fix(80.0)).radius, 80.0);
    }

    #[test]
    fn test_display_speed() {
        assert_eq!(display_speed_kmh(10.0), "36.00 km/h");
        assert_eq!(display_speed_kmh(-1.0), "0 km/h");
        assert_eq!(display_speed_kmh(0.0), "0 km/h");
    }

    #[test]
    fn test_track_sources() {
        let mut track = FixTrack::new();
        track.push_raw(fix(1.0));
        track.push_raw(fix(2.0));
        track.push_filtered(fix(3.0));

        assert_eq!(track.get(TrackSource::Raw).len(), 2);
        assert_eq!(track.get(TrackSource::Filtered).len(), 1);
        assert!(track.get(TrackSource::External).is_empty());

        track.clear();
        assert!(track.raw().is_empty());
    }

    #[test]
    fn test_track_source_cli_names() {
        assert_eq!(TrackSource::from_str("external", false), Ok(TrackSource::External));
        assert_eq!(TrackSource::from_str("filtered", false), Ok(TrackSource::Filtered));
        assert!(TrackSource::from_str("smoothed", false).is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::fs;

use crate::pipeline::FixPipeline;
use crate::track::display_speed_kmh;
use crate::types::current_timestamp;

/// Snapshot written periodically by the live tracker
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub fixes_received: u64,
    pub fixes_accepted: u64,
    pub rejected_stale: u64,
    pub rejected_invalid_accuracy: u64,
    pub rejected_low_accuracy: u64,
    // newest raw fix
    pub gps_speed: f64,
    pub gps_speed_label: String,
    pub gps_accuracy: f64,
    pub gps_lat: f64,
    pub gps_lon: f64,
    pub marker_radius: f64,
    // newest filtered fix
    pub filtered_speed: f64,
    pub filtered_speed_label: String,
    pub smoother_time: f64,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds: 0,
            fixes_received: 0,
            fixes_accepted: 0,
            rejected_stale: 0,
            rejected_invalid_accuracy: 0,
            rejected_low_accuracy: 0,
            gps_speed: 0.0,
            gps_speed_label: display_speed_kmh(0.0),
            gps_accuracy: 0.0,
            gps_lat: 0.0,
            gps_lon: 0.0,
            marker_radius: 0.0,
            filtered_speed: 0.0,
            filtered_speed_label: display_speed_kmh(0.0),
            smoother_time: 0.0,
        }
    }

    pub fn from_pipeline(pipeline: &FixPipeline, uptime_seconds: u64) -> Self {
        let stats = pipeline.stats();
        let mut status = Self::new();
        status.uptime_seconds = uptime_seconds;
        status.fixes_received = stats.received;
        status.fixes_accepted = stats.accepted;
        status.rejected_stale = stats.rejected_stale;
        status.rejected_invalid_accuracy = stats.rejected_invalid_accuracy;
        status.rejected_low_accuracy = stats.rejected_low_accuracy;

        if let Some(raw) = pipeline.track().raw().last() {
            status.gps_speed = raw.speed;
            status.gps_speed_label = display_speed_kmh(raw.speed);
            status.gps_accuracy = raw.horizontal_accuracy;
            status.gps_lat = raw.coordinate.latitude;
            status.gps_lon = raw.coordinate.longitude;
        }
        if let Some(marker) = pipeline.marker() {
            status.marker_radius = marker.radius;
        }
        if let Some(filtered) = pipeline.latest_filtered() {
            status.filtered_speed = filtered.speed;
            status.filtered_speed_label = display_speed_kmh(filtered.speed);
            status.smoother_time = filtered.timestamp;
        }
        status
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{EmaFixSmoother, QualityGate};
    use crate::types::{Coordinate, Fix};

    #[test]
    fn test_status_from_pipeline() {
        let mut pipeline = FixPipeline::new(
            QualityGate::default(),
            Box::new(EmaFixSmoother::new(2.0, 0.9, 5.0).unwrap()),
        );
        pipeline.process(Fix::new(Coordinate::new(1.0, 2.0), 5.0, 10.0, 50.0), 50.0);
        pipeline.process(Fix::new(Coordinate::new(1.0, 2.1), 70.0, 3.0, 51.0), 51.0);

        let status = LiveStatus::from_pipeline(&pipeline, 12);
        assert_eq!(status.uptime_seconds, 12);
        assert_eq!(status.fixes_received, 2);
        assert_eq!(status.fixes_accepted, 1);
        assert_eq!(status.rejected_low_accuracy, 1);
        assert_eq!(status.gps_lon, 2.1);
        assert_eq!(status.marker_radius, 70.0);
        assert_eq!(status.filtered_speed, 10.0);
        assert_eq!(status.filtered_speed_label, "36.00 km/h");
    }

    #[test]
    fn test_empty_pipeline_status() {
        let pipeline = FixPipeline::new(
            QualityGate::default(),
            Box::new(EmaFixSmoother::new(2.0, 0.9, 5.0).unwrap()),
        );
        let status = LiveStatus::from_pipeline(&pipeline, 0);
        assert_eq!(status.fixes_received, 0);
        assert_eq!(status.gps_speed_label, "0 km/h");
    }

    #[test]
    fn test_save_reports_unwritable_path() {
        let status = LiveStatus::new();
        assert!(status
            .save("/nonexistent_fix_trail_dir/live_status.json")
            .is_err());
    }
}

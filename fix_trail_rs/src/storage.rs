use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gradient::StyledTrack;
use crate::pipeline::PipelineStats;
use crate::track::{Marker, TrackSource};
use crate::types::{Fix, Timestamp};

/// Complete replay/session export (JSON-serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackExport {
    pub generated_at: String,
    pub source: TrackSource,
    pub stats: PipelineStats,
    pub raw: Vec<Fix>,
    pub filtered: Vec<Fix>,
    pub styled: StyledTrack,
    pub marker: Option<Marker>,
}

impl TrackExport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// GPX of the filtered fixes, or of the raw fixes when nothing passed the gate
    pub fn to_gpx(&self, name: &str) -> GpxTrack {
        let fixes = if self.filtered.is_empty() {
            &self.raw
        } else {
            &self.filtered
        };
        create_gpx_track(name, &self.generated_at, fixes)
    }
}

/// GPX track format for mapping applications
#[derive(Debug, Serialize)]
pub struct GpxTrack {
    pub name: String,
    pub description: String,
    pub track_points: Vec<GpxPoint>,
}

#[derive(Debug, Serialize)]
pub struct GpxPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: f64,
    pub time: String,
    pub speed: f64,
}

impl GpxTrack {
    pub fn to_gpx_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<gpx version=\"1.1\" creator=\"fix_trail\">\n");
        xml.push_str("  <metadata>\n");
        xml.push_str(&format!("    <name>{}</name>\n", escape_xml(&self.name)));
        xml.push_str(&format!("    <desc>{}</desc>\n", escape_xml(&self.description)));
        xml.push_str("  </metadata>\n");
        xml.push_str("  <trk>\n");
        xml.push_str(&format!("    <name>{}</name>\n", escape_xml(&self.name)));
        xml.push_str("    <trkseg>\n");

        for point in &self.track_points {
            xml.push_str(&format!("      <trkpt lat=\"{}\" lon=\"{}\">\n", point.lat, point.lon));
            xml.push_str(&format!("        <ele>{}</ele>\n", point.ele));
            xml.push_str(&format!("        <time>{}</time>\n", point.time));
            xml.push_str(&format!(
                "        <extensions><speed>{:.3}</speed></extensions>\n",
                point.speed
            ));
            xml.push_str("      </trkpt>\n");
        }

        xml.push_str("    </trkseg>\n");
        xml.push_str("  </trk>\n");
        xml.push_str("</gpx>\n");

        xml
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// RFC 3339 rendering of a fix timestamp
pub fn timestamp_rfc3339(timestamp: Timestamp) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

pub fn create_gpx_track(name: &str, generated_at: &str, fixes: &[Fix]) -> GpxTrack {
    let track_points = fixes
        .iter()
        .map(|fix| GpxPoint {
            lat: fix.coordinate.latitude,
            lon: fix.coordinate.longitude,
            ele: fix.altitude,
            time: timestamp_rfc3339(fix.timestamp),
            speed: fix.speed.max(0.0),
        })
        .collect();

    GpxTrack {
        name: name.to_string(),
        description: format!("Generated {}", generated_at),
        track_points,
    }
}

use serde::Deserialize;
use std::process::Command;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

use crate::types::{current_timestamp, Coordinate, Fix};

/// Poll the location source and push one delivery batch per tick
///
/// Falls back to a synthetic walk when `termux-location` is unavailable.
pub async fn fix_loop(tx: Sender<Vec<Fix>>, period: Duration, use_termux: bool) {
    let mut interval = interval(period);
    let mut seq = 0u64;
    let mut warned = false;

    loop {
        interval.tick().await;

        let fix = if use_termux {
            match read_termux_location() {
                Some(fix) => fix,
                None => {
                    if !warned {
                        log::warn!("[location] termux-location unavailable, using synthetic fixes");
                        warned = true;
                    }
                    mock_fix(seq, current_timestamp())
                }
            }
        } else {
            mock_fix(seq, current_timestamp())
        };
        seq += 1;

        match tx.try_send(vec![fix]) {
            Ok(_) => {
                if seq % 10 == 0 {
                    log::debug!("[location] {} fixes", seq);
                }
            }
            Err(TrySendError::Closed(_)) => {
                log::info!("[location] Channel closed after {} fixes", seq);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // consumer is behind, drop this fix
            }
        }
    }
}

#[derive(Deserialize)]
struct TermuxLocation {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    altitude: f64,
    accuracy: f64,
    #[serde(default)]
    vertical_accuracy: Option<f64>,
    #[serde(default)]
    bearing: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    elapsed_ms: Option<f64>,
}

fn read_termux_location() -> Option<Fix> {
    let output = Command::new("termux-location")
        .arg("-p")
        .arg("gps")
        .arg("-r")
        .arg("once")
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    parse_termux_location(&text, current_timestamp())
}

/// Parse `termux-location` JSON; `elapsed_ms` dates the fix back from `now`
pub fn parse_termux_location(text: &str, now: f64) -> Option<Fix> {
    let loc: TermuxLocation = serde_json::from_str(text).ok()?;
    let timestamp = now - loc.elapsed_ms.unwrap_or(0.0) / 1000.0;

    let mut fix = Fix::new(
        Coordinate::new(loc.latitude, loc.longitude),
        loc.accuracy,
        loc.speed.unwrap_or(-1.0),
        timestamp,
    );
    fix.altitude = loc.altitude;
    fix.vertical_accuracy = loc.vertical_accuracy.unwrap_or(-1.0);
    fix.course = loc.bearing.unwrap_or(-1.0);
    Some(fix)
}

/// Synthetic walk with the usual defects: every 7th fix has a poor
/// accuracy, every 11th has no speed, every 13th arrives 6 s late.
pub fn mock_fix(seq: u64, now: f64) -> Fix {
    let t = seq as f64;
    let accuracy = if seq % 7 == 6 {
        65.0
    } else {
        5.0 + (t * 0.1).sin() * 2.0
    };
    let speed = if seq % 11 == 10 {
        -1.0
    } else {
        2.5 + (t * 0.2).sin() * 1.5
    };
    let timestamp = if seq % 13 == 12 { now - 6.0 } else { now };

    Fix::new(
        Coordinate::new(41.887 + t * 0.00001, -87.622 + t * 0.00001),
        accuracy,
        speed,
        timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_termux_location() {
        let json = r#"{
            "latitude": 41.887,
            "longitude": -87.622,
            "altitude": 180.5,
            "accuracy": 8.0,
            "vertical_accuracy": 3.0,
            "bearing": 270.0,
            "speed": 1.25,
            "elapsed_ms": 1500,
            "provider": "gps"
        }"#;
        let fix = parse_termux_location(json, 1000.0).unwrap();

        assert_eq!(fix.coordinate, Coordinate::new(41.887, -87.622));
        assert_eq!(fix.horizontal_accuracy, 8.0);
        assert_eq!(fix.speed, 1.25);
        assert_eq!(fix.timestamp, 998.5);
        assert_eq!(fix.course, 270.0);
    }

    #[test]
    fn test_parse_missing_speed_is_unknown() {
        let json = r#"{"latitude": 1.0, "longitude": 2.0, "accuracy": 4.0}"#;
        let fix = parse_termux_location(json, 10.0).unwrap();
        assert_eq!(fix.speed, -1.0);
        assert_eq!(fix.timestamp, 10.0);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_termux_location("termux-location: not found", 0.0).is_none());
    }

    #[test]
    fn test_mock_defects() {
        assert_eq!(mock_fix(6, 100.0).horizontal_accuracy, 65.0);
        assert_eq!(mock_fix(10, 100.0).speed, -1.0);
        assert_eq!(mock_fix(12, 100.0).timestamp, 94.0);
        assert_eq!(mock_fix(0, 100.0).timestamp, 100.0);
    }
}

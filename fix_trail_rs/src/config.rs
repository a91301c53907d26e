use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::filters::quality_gate::{DEFAULT_MAX_AGE_SECS, DEFAULT_MAX_HORIZONTAL_ACCURACY_M};
use crate::filters::kalman_speed::{DEFAULT_ACCEL_VAR, DEFAULT_SPEED_VAR};
use crate::filters::{
    EmaFixSmoother, ExternalFilter, KalmanSpeedFilter, QualityGate, DEFAULT_STALE_SPEED_SECS,
};
use crate::gradient::{GradientMapper, GradientSpec, StyleValue, WidthPolicy, DEFAULT_LINE_WIDTH};
use crate::track::TrackSource;

/// Knots for an optional width gradient
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WidthBand {
    pub domain: [f64; 4],
    pub widths: [f64; 4],
}

/// Everything tunable about the fix pipeline and the track styling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_fix_age_secs: f64,
    pub max_horizontal_accuracy_m: f64,
    pub tick_interval_secs: f64,
    pub decay_factor: f64,
    pub stale_speed_secs: f64,
    /// Process noise of the Kalman speed filter behind the external track
    pub kalman_accel_var: f64,
    /// Measurement noise used when a fix carries no speed accuracy
    pub kalman_speed_var: f64,
    pub hue_band_min_kmh: f64,
    pub hue_band_max_kmh: f64,
    pub width_band: Option<WidthBand>,
    pub width_policy: WidthPolicy,
    pub style_value: StyleValue,
    pub line_width: f64,
    pub track_source: TrackSource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_fix_age_secs: DEFAULT_MAX_AGE_SECS,
            max_horizontal_accuracy_m: DEFAULT_MAX_HORIZONTAL_ACCURACY_M,
            tick_interval_secs: 2.0,
            decay_factor: 0.9,
            stale_speed_secs: DEFAULT_STALE_SPEED_SECS,
            kalman_accel_var: DEFAULT_ACCEL_VAR,
            kalman_speed_var: DEFAULT_SPEED_VAR,
            hue_band_min_kmh: 7.0,
            hue_band_max_kmh: 14.0,
            width_band: None,
            width_policy: WidthPolicy::EndPoint,
            style_value: StyleValue::Speed,
            line_width: DEFAULT_LINE_WIDTH,
            track_source: TrackSource::Raw,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config; missing keys keep their defaults
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        log::info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.gate()?;
        self.smoother()?;
        self.kalman()?;
        self.mapper()?;
        Ok(())
    }

    pub fn gate(&self) -> ConfigResult<QualityGate> {
        QualityGate::new(self.max_fix_age_secs, self.max_horizontal_accuracy_m)
    }

    pub fn smoother(&self) -> ConfigResult<EmaFixSmoother> {
        EmaFixSmoother::new(
            self.tick_interval_secs,
            self.decay_factor,
            self.stale_speed_secs,
        )
    }

    pub fn kalman(&self) -> ConfigResult<KalmanSpeedFilter> {
        KalmanSpeedFilter::new(self.kalman_accel_var, self.kalman_speed_var)
    }

    /// Smoother feeding the external track, attached when that track is drawn
    pub fn external_smoother(&self) -> ConfigResult<Option<ExternalFilter<KalmanSpeedFilter>>> {
        if self.track_source != TrackSource::External {
            return Ok(None);
        }
        Ok(Some(ExternalFilter::new(self.kalman()?, "kalman")))
    }

    pub fn mapper(&self) -> ConfigResult<GradientMapper> {
        let hue = GradientSpec::speed_hue_kmh(self.hue_band_min_kmh, self.hue_band_max_kmh)?;
        let mut mapper = GradientMapper::new(hue, self.line_width)?
            .with_value(self.style_value)
            .with_width_policy(self.width_policy);
        if let Some(band) = self.width_band {
            mapper = mapper.with_width(GradientSpec::new(band.domain, band.widths)?);
        }
        Ok(mapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval_secs, 2.0);
        assert_eq!(config.decay_factor, 0.9);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"decay_factor": 0.5, "track_source": "filtered"}"#).unwrap();
        assert_eq!(config.decay_factor, 0.5);
        assert_eq!(config.track_source, TrackSource::Filtered);
        assert_eq!(config.max_horizontal_accuracy_m, 50.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = PipelineConfig {
            tick_interval_secs: 0.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::InvalidTickInterval(0.0)
        );

        let config = PipelineConfig {
            hue_band_min_kmh: 14.0,
            hue_band_max_kmh: 7.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnorderedThresholds(_))
        ));

        let config = PipelineConfig {
            stale_speed_secs: -1.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::InvalidStaleSpeedCutoff(-1.0)
        );

        let config = PipelineConfig {
            kalman_speed_var: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidNoise(_))));
    }

    #[test]
    fn test_width_band_builds_width_mapping() {
        let config = PipelineConfig {
            width_band: Some(WidthBand {
                domain: [0.0, 1.0, 2.0, 3.0],
                widths: [2.0, 4.0, 6.0, 8.0],
            }),
            ..Default::default()
        };
        let mapper = config.mapper().unwrap();
        let fix = crate::types::Fix::new(crate::types::Coordinate::new(0.0, 0.0), 5.0, 3.0, 0.0);
        assert_eq!(mapper.point(&fix).width, 8.0);
    }

    #[test]
    fn test_external_smoother_follows_track_source() {
        assert!(PipelineConfig::default().external_smoother().unwrap().is_none());

        let config = PipelineConfig {
            track_source: TrackSource::External,
            ..Default::default()
        };
        assert!(config.external_smoother().unwrap().is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/fix_trail.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}

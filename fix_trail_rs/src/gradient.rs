//! Piecewise-linear mapping from a scalar (speed, accuracy) to stroke hue and
//! width, and the per-segment styling of a fix track built on top of it.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Coordinate, Fix};

/// m/s to km/h
pub const MS_TO_KMH: f64 = 3.6;

// Hues are fractions of a full turn
pub const HUE_BAND_LOW: f64 = 180.0 / 360.0;
pub const HUE_BAND_HIGH: f64 = 60.0 / 360.0;
pub const HUE_SLOWEST: f64 = 240.0 / 360.0;
pub const HUE_FASTEST: f64 = 0.0;

pub const DEFAULT_BAND_MIN_KMH: f64 = 3.0;
pub const DEFAULT_BAND_MAX_KMH: f64 = 7.0;

pub const DEFAULT_LINE_WIDTH: f64 = 7.0;

/// Four knots `[V_min, v_lo, v_hi, V_max]` with the output at each knot
///
/// Inside `[v_lo, v_hi]` the output moves between the two band outputs; the
/// outer segments lead to the clamp outputs, and anything past `V_min` or
/// `V_max` is clamped. Outputs may run either way, which fixes the
/// orientation (the speed hues run from blue for slow to red for fast).
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GradientSpec {
    domain: [f64; 4],
    output: [f64; 4],
}

impl GradientSpec {
    pub fn new(domain: [f64; 4], output: [f64; 4]) -> ConfigResult<Self> {
        if domain.iter().chain(output.iter()).any(|v| !v.is_finite()) {
            return Err(ConfigError::UnorderedThresholds(format!(
                "non-finite knot in {:?} -> {:?}",
                domain, output
            )));
        }
        if domain.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::UnorderedThresholds(format!("{:?}", domain)));
        }
        Ok(Self { domain, output })
    }

    /// Band `[v_lo, v_hi]` padded by half its width on each side
    pub fn from_reference_band(
        v_lo: f64,
        v_hi: f64,
        out_lo: f64,
        out_hi: f64,
        out_min: f64,
        out_max: f64,
    ) -> ConfigResult<Self> {
        let half_range = (v_hi - v_lo) / 2.0;
        Self::new(
            [v_lo - half_range, v_lo, v_hi, v_hi + half_range],
            [out_min, out_lo, out_hi, out_max],
        )
    }

    /// Speed hue gradient for a band given in km/h, mapped over m/s input
    pub fn speed_hue_kmh(band_min_kmh: f64, band_max_kmh: f64) -> ConfigResult<Self> {
        Self::from_reference_band(
            band_min_kmh / MS_TO_KMH,
            band_max_kmh / MS_TO_KMH,
            HUE_BAND_LOW,
            HUE_BAND_HIGH,
            HUE_SLOWEST,
            HUE_FASTEST,
        )
    }

    pub fn domain(&self) -> [f64; 4] {
        self.domain
    }

    pub fn output(&self) -> [f64; 4] {
        self.output
    }

    /// Map one value. NaN maps like a value below the domain.
    pub fn map(&self, value: f64) -> f64 {
        let [v_min, v_lo, v_hi, v_max] = self.domain;
        let [o_min, o_lo, o_hi, o_max] = self.output;

        if value.is_nan() || value <= v_min {
            o_min
        } else if value >= v_max {
            o_max
        } else if value >= v_hi {
            lerp(value, v_hi, v_max, o_hi, o_max)
        } else if value <= v_lo {
            lerp(value, v_min, v_lo, o_min, o_lo)
        } else {
            lerp(value, v_lo, v_hi, o_lo, o_hi)
        }
    }
}

impl Default for GradientSpec {
    fn default() -> Self {
        let half = (DEFAULT_BAND_MAX_KMH - DEFAULT_BAND_MIN_KMH) / MS_TO_KMH / 2.0;
        let v_lo = DEFAULT_BAND_MIN_KMH / MS_TO_KMH;
        let v_hi = DEFAULT_BAND_MAX_KMH / MS_TO_KMH;
        Self {
            domain: [v_lo - half, v_lo, v_hi, v_hi + half],
            output: [HUE_SLOWEST, HUE_BAND_LOW, HUE_BAND_HIGH, HUE_FASTEST],
        }
    }
}

// exact at both knots
fn lerp(value: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    let t = (value - x0) / (x1 - x0);
    y0 * (1.0 - t) + y1 * t
}

pub fn map_hue(value: f64, spec: &GradientSpec) -> f64 {
    spec.map(value)
}

pub fn map_width(value: f64, spec: &GradientSpec) -> f64 {
    spec.map(value)
}

/// Which fix field drives the styling
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleValue {
    Speed,
    HorizontalAccuracy,
}

impl StyleValue {
    pub fn of(self, fix: &Fix) -> f64 {
        match self {
            StyleValue::Speed => fix.speed,
            StyleValue::HorizontalAccuracy => fix.horizontal_accuracy,
        }
    }
}

/// How a segment's stroke width is derived from its endpoints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidthPolicy {
    /// Constant stroke using the later point's width
    #[default]
    EndPoint,
    /// Stroke tapers from the earlier point's width to the later one's
    Interpolated,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyledPoint {
    pub coordinate: Coordinate,
    pub hue: f64,
    /// `hue` as a fully saturated color
    pub color: Rgb,
    pub width: f64,
}

/// One gradient stroke between consecutive points
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub from: Coordinate,
    pub to: Coordinate,
    pub from_hue: f64,
    pub to_hue: f64,
    pub from_width: f64,
    pub to_width: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StyledTrack {
    pub points: Vec<StyledPoint>,
    pub segments: Vec<Segment>,
}

/// Hue mapping, optional width mapping and the segment width policy
#[derive(Clone, Debug, PartialEq)]
pub struct GradientMapper {
    hue: GradientSpec,
    width: Option<GradientSpec>,
    line_width: f64,
    value: StyleValue,
    width_policy: WidthPolicy,
}

impl GradientMapper {
    pub fn new(hue: GradientSpec, line_width: f64) -> ConfigResult<Self> {
        if !(line_width.is_finite() && line_width > 0.0) {
            return Err(ConfigError::InvalidLineWidth(line_width));
        }
        Ok(Self {
            hue,
            width: None,
            line_width,
            value: StyleValue::Speed,
            width_policy: WidthPolicy::default(),
        })
    }

    /// Map width from the value too, instead of a constant line width
    pub fn with_width(mut self, width: GradientSpec) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_value(mut self, value: StyleValue) -> Self {
        self.value = value;
        self
    }

    pub fn with_width_policy(mut self, policy: WidthPolicy) -> Self {
        self.width_policy = policy;
        self
    }

    pub fn point(&self, fix: &Fix) -> StyledPoint {
        let value = self.value.of(fix);
        let hue = map_hue(value, &self.hue);
        StyledPoint {
            coordinate: fix.coordinate,
            hue,
            color: hue_to_rgb(hue),
            width: self
                .width
                .as_ref()
                .map(|spec| map_width(value, spec))
                .unwrap_or(self.line_width),
        }
    }

    pub fn style(&self, fixes: &[Fix]) -> StyledTrack {
        let points: Vec<StyledPoint> = fixes.iter().map(|fix| self.point(fix)).collect();
        let segments = points
            .windows(2)
            .map(|pair| {
                let (prev, cur) = (pair[0], pair[1]);
                let from_width = match self.width_policy {
                    WidthPolicy::EndPoint => cur.width,
                    WidthPolicy::Interpolated => prev.width,
                };
                Segment {
                    from: prev.coordinate,
                    to: cur.coordinate,
                    from_hue: prev.hue,
                    to_hue: cur.hue,
                    from_width,
                    to_width: cur.width,
                }
            })
            .collect();
        StyledTrack { points, segments }
    }
}

impl Default for GradientMapper {
    fn default() -> Self {
        Self {
            hue: GradientSpec::default(),
            width: None,
            line_width: DEFAULT_LINE_WIDTH,
            value: StyleValue::Speed,
            width_policy: WidthPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Fully saturated, full brightness color for a hue in turns
pub fn hue_to_rgb(hue: f64) -> Rgb {
    let h6 = hue.rem_euclid(1.0) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let (r, g, b) = match sector as u8 {
        0 => (1.0, f, 0.0),
        1 => (1.0 - f, 1.0, 0.0),
        2 => (0.0, 1.0, f),
        3 => (0.0, 1.0 - f, 1.0),
        4 => (f, 0.0, 1.0),
        _ => (1.0, 0.0, 1.0 - f),
    };
    let to_u8 = |c: f64| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb {
        r: to_u8(r),
        g: to_u8(g),
        b: to_u8(b),
    }
}

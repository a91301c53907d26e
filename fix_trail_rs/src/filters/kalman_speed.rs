use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::filters::StepFilter;
use crate::types::{Fix, Timestamp};

pub const DEFAULT_ACCEL_VAR: f64 = 0.5;
/// GPS speed noise, 0.3 m/s std
pub const DEFAULT_SPEED_VAR: f64 = 0.09;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KalmanSpeedState {
    pub speed: f64,
    pub variance: f64,
    pub timestamp: Timestamp,
}

/// Constant-speed Kalman filter over the scalar fix speed
///
/// Process noise grows with `dt² * accel_var` between fixes. A fix's own
/// `speed_accuracy` is used as the measurement std when present, otherwise
/// `speed_var`. Fixes without a usable speed only run the prediction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KalmanSpeedFilter {
    accel_var: f64,
    speed_var: f64,
}

impl KalmanSpeedFilter {
    pub fn new(accel_var: f64, speed_var: f64) -> ConfigResult<Self> {
        if !(accel_var.is_finite() && accel_var > 0.0) {
            return Err(ConfigError::InvalidNoise(format!("accel variance {}", accel_var)));
        }
        if !(speed_var.is_finite() && speed_var > 0.0) {
            return Err(ConfigError::InvalidNoise(format!("speed variance {}", speed_var)));
        }
        Ok(Self {
            accel_var,
            speed_var,
        })
    }

    fn measurement(&self, fix: &Fix) -> Option<(f64, f64)> {
        if !(fix.speed.is_finite() && fix.speed >= 0.0) {
            return None;
        }
        let r = if fix.speed_accuracy.is_finite() && fix.speed_accuracy > 0.0 {
            fix.speed_accuracy * fix.speed_accuracy
        } else {
            self.speed_var
        };
        Some((fix.speed, r))
    }
}

impl Default for KalmanSpeedFilter {
    fn default() -> Self {
        Self {
            accel_var: DEFAULT_ACCEL_VAR,
            speed_var: DEFAULT_SPEED_VAR,
        }
    }
}

impl StepFilter for KalmanSpeedFilter {
    type State = KalmanSpeedState;

    fn initialize(&self, first_fix: &Fix) -> Self::State {
        let (speed, variance) = self.measurement(first_fix).unwrap_or((0.0, self.speed_var));
        KalmanSpeedState {
            speed,
            variance,
            timestamp: first_fix.timestamp,
        }
    }

    fn step(&self, state: &Self::State, next_fix: &Fix) -> (Fix, Self::State) {
        // out-of-order fixes predict over a zero gap
        let dt = (next_fix.timestamp - state.timestamp).max(0.0);
        let predicted = state.variance + dt * dt * self.accel_var;

        let (speed, variance) = match self.measurement(next_fix) {
            Some((z, r)) => {
                let gain = predicted / (predicted + r);
                (state.speed + gain * (z - state.speed), (1.0 - gain) * predicted)
            }
            None => (state.speed, predicted),
        };

        let next = KalmanSpeedState {
            speed,
            variance,
            timestamp: state.timestamp.max(next_fix.timestamp),
        };
        (next_fix.with_speed(speed, next_fix.timestamp), next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinate;
    use approx::assert_relative_eq;

    fn fix(speed: f64, timestamp: f64) -> Fix {
        Fix::new(Coordinate::new(41.887, -87.622), 5.0, speed, timestamp)
    }

    #[test]
    fn test_single_update() {
        let kf = KalmanSpeedFilter::default();
        let state = kf.initialize(&fix(2.0, 0.0));
        assert_eq!(state.speed, 2.0);
        assert_eq!(state.variance, DEFAULT_SPEED_VAR);

        let (out, next) = kf.step(&state, &fix(4.0, 1.0));
        // P = 0.09 + 0.5, K = 0.59 / 0.68
        let gain = 0.59 / 0.68;
        assert_relative_eq!(out.speed, 2.0 + gain * 2.0, max_relative = 1e-12);
        assert_relative_eq!(next.variance, (1.0 - gain) * 0.59, max_relative = 1e-12);
        assert_eq!(out.timestamp, 1.0);
    }

    #[test]
    fn test_converges_to_constant_speed() {
        let kf = KalmanSpeedFilter::default();
        let mut state = kf.initialize(&fix(0.0, 0.0));
        let mut out = fix(0.0, 0.0);
        for i in 1..50 {
            let (filtered, next) = kf.step(&state, &fix(5.0, i as f64));
            out = filtered;
            state = next;
        }
        assert_relative_eq!(out.speed, 5.0, max_relative = 1e-6);
    }

    #[test]
    fn test_unknown_speed_only_predicts() {
        let kf = KalmanSpeedFilter::default();
        let state = kf.initialize(&fix(3.0, 0.0));
        let (out, next) = kf.step(&state, &fix(-1.0, 2.0));

        assert_eq!(out.speed, 3.0);
        assert_relative_eq!(next.variance, 0.09 + 4.0 * 0.5, max_relative = 1e-12);

        let (out, _) = kf.step(&next, &fix(f64::NAN, 3.0));
        assert_eq!(out.speed, 3.0);
    }

    #[test]
    fn test_speed_accuracy_sets_measurement_noise() {
        let kf = KalmanSpeedFilter::default();
        let state = kf.initialize(&fix(0.0, 0.0));

        let mut precise = fix(10.0, 0.5);
        precise.speed_accuracy = 0.01;
        let mut coarse = fix(10.0, 0.5);
        coarse.speed_accuracy = 5.0;

        let (a, _) = kf.step(&state, &precise);
        let (b, _) = kf.step(&state, &coarse);
        assert!(a.speed > b.speed);
        assert!(a.speed > 9.0);
    }

    #[test]
    fn test_out_of_order_fix_does_not_rewind() {
        let kf = KalmanSpeedFilter::default();
        let state = kf.initialize(&fix(2.0, 10.0));
        let (_, next) = kf.step(&state, &fix(2.0, 8.0));
        assert_eq!(next.timestamp, 10.0);
    }

    #[test]
    fn test_noise_validation() {
        assert!(KalmanSpeedFilter::new(0.0, 0.09).is_err());
        assert!(KalmanSpeedFilter::new(0.5, f64::NAN).is_err());
        assert!(KalmanSpeedFilter::new(0.5, 0.09).is_ok());
    }
}

//! Fix filtering: the quality gate and the speed smoothers behind one interface
//!
//! The pipeline only talks to `FixSmoother`. The time-aware EMA is the
//! default; any `StepFilter` can be plugged in through `ExternalFilter`.

pub mod kalman_speed;
pub mod quality_gate;
pub mod speed_ema;

pub use kalman_speed::{KalmanSpeedFilter, KalmanSpeedState};
pub use quality_gate::{GateDecision, QualityGate};
pub use speed_ema::{SmootherState, SpeedSmoother};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Fix, Timestamp};

/// Measurements older than this at ingestion carry no motion signal (seconds)
pub const DEFAULT_STALE_SPEED_SECS: f64 = 5.0;

/// Turns an accepted fix into a filtered fix
pub trait FixSmoother: Send {
    fn smooth(&mut self, fix: &Fix, now: Timestamp) -> Fix;

    fn name(&self) -> &'static str;

    /// Drop any accumulated state
    fn reset(&mut self);
}

/// `SpeedSmoother` plus the ingestion policy applied before each prediction:
/// unknown (negative) speeds count as 0, and so do speeds whose fix is older
/// than `stale_speed_secs`.
#[derive(Clone, Debug)]
pub struct EmaFixSmoother {
    smoother: SpeedSmoother,
    stale_speed_secs: f64,
}

impl EmaFixSmoother {
    pub fn new(tick_interval: f64, decay_factor: f64, stale_speed_secs: f64) -> ConfigResult<Self> {
        if !(stale_speed_secs.is_finite() && stale_speed_secs >= 0.0) {
            return Err(ConfigError::InvalidStaleSpeedCutoff(stale_speed_secs));
        }
        Ok(Self {
            smoother: SpeedSmoother::new(tick_interval, decay_factor)?,
            stale_speed_secs,
        })
    }

    /// Speed handed to the smoother for this fix
    ///
    /// Anything that is not a finite, non-negative speed from a recent fix
    /// enters as 0, so one bad sample cannot poison the estimate.
    pub fn ingest_speed(&self, fix: &Fix, now: Timestamp) -> f64 {
        if !(fix.age(now) <= self.stale_speed_secs) {
            return 0.0;
        }
        if fix.speed.is_finite() && fix.speed >= 0.0 {
            fix.speed
        } else {
            0.0
        }
    }

    pub fn smoother(&self) -> &SpeedSmoother {
        &self.smoother
    }
}

impl FixSmoother for EmaFixSmoother {
    fn smooth(&mut self, fix: &Fix, now: Timestamp) -> Fix {
        let speed = self.ingest_speed(fix, now);
        let (value, time) = self.smoother.predict(speed, fix.timestamp, now);
        fix.with_speed(value, time)
    }

    fn name(&self) -> &'static str {
        "ema"
    }

    fn reset(&mut self) {
        self.smoother.reset();
    }
}

/// Black-box filter with explicit state threading, e.g. a Kalman filter
pub trait StepFilter {
    type State;

    fn initialize(&self, first_fix: &Fix) -> Self::State;

    fn step(&self, state: &Self::State, next_fix: &Fix) -> (Fix, Self::State);
}

/// Adapts a `StepFilter` to `FixSmoother` by holding its state between calls
pub struct ExternalFilter<F: StepFilter> {
    filter: F,
    name: &'static str,
    state: Option<F::State>,
}

impl<F: StepFilter> ExternalFilter<F> {
    pub fn new(filter: F, name: &'static str) -> Self {
        Self {
            filter,
            name,
            state: None,
        }
    }

    pub fn state(&self) -> Option<&F::State> {
        self.state.as_ref()
    }
}

impl<F> FixSmoother for ExternalFilter<F>
where
    F: StepFilter + Send,
    F::State: Send,
{
    fn smooth(&mut self, fix: &Fix, _now: Timestamp) -> Fix {
        match self.state.take() {
            None => {
                self.state = Some(self.filter.initialize(fix));
                fix.clone()
            }
            Some(state) => {
                let (filtered, next) = self.filter.step(&state, fix);
                self.state = Some(next);
                filtered
            }
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn reset(&mut self) {
        self.state = None;
    }
}

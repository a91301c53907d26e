use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Timestamp;

pub const DEFAULT_TICK_INTERVAL: f64 = 1.0;
pub const DEFAULT_DECAY_FACTOR: f64 = 0.5;

/// Mutable part of the smoother, present once the first measurement arrived
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmootherState {
    pub last_update_time: Timestamp,
    pub last_value: f64,
}

/// Time-aware exponential smoothing for scalar speed
///
/// All aging is mapped onto a virtual grid of `tick_interval` seconds. Across
/// a gap of `elapsed` seconds the estimate decays once for every tick
/// `0, tick, 2 * tick, ...` that stays below `elapsed - tick`, each time by
/// `(1 - decay_factor)`, then a new measurement is blended with
/// weight `decay_factor`. When no usable measurement arrives the estimate
/// still ages up to `now`.
///
/// Not synchronized: one `predict` call at a time per instance.
#[derive(Clone, Debug)]
pub struct SpeedSmoother {
    tick_interval: f64,
    decay_factor: f64,
    state: Option<SmootherState>,
}

impl SpeedSmoother {
    pub fn new(tick_interval: f64, decay_factor: f64) -> ConfigResult<Self> {
        if !(tick_interval.is_finite() && tick_interval > 0.0) {
            return Err(ConfigError::InvalidTickInterval(tick_interval));
        }
        if !(decay_factor > 0.0 && decay_factor <= 1.0) {
            return Err(ConfigError::InvalidDecayFactor(decay_factor));
        }
        Ok(Self {
            tick_interval,
            decay_factor,
            state: None,
        })
    }

    /// Smoother that already holds an estimate
    pub fn seeded(
        time: Timestamp,
        value: f64,
        tick_interval: f64,
        decay_factor: f64,
    ) -> ConfigResult<Self> {
        let mut smoother = Self::new(tick_interval, decay_factor)?;
        smoother.state = Some(SmootherState {
            last_update_time: time,
            last_value: value,
        });
        Ok(smoother)
    }

    /// Feed one measurement and return `(smoothed_value, result_time)`
    ///
    /// The first call seeds the state and echoes the measurement back.
    pub fn predict(
        &mut self,
        measured_value: f64,
        measured_time: Timestamp,
        now: Timestamp,
    ) -> (f64, Timestamp) {
        let Some(state) = self.state.as_mut() else {
            self.state = Some(SmootherState {
                last_update_time: measured_time,
                last_value: measured_value,
            });
            return (measured_value, measured_time);
        };

        let tick = self.tick_interval;
        let decay = self.decay_factor;
        let last = state.last_update_time;
        let fresh = now - measured_time < tick;

        if fresh && measured_time >= last {
            // current enough to stand in for "now"
            let value = decay_ticks(state.last_value, measured_time - last, tick, decay);
            state.last_value = blend(measured_value, value, decay);
            state.last_update_time = measured_time;
        } else if measured_time > last {
            // late, but still newer than the estimate: replay it at its own
            // time, then age the result up to now
            let value = decay_ticks(state.last_value, measured_time - last, tick, decay);
            let value = blend(measured_value, value, decay);
            state.last_value = decay_ticks(value, now - measured_time, tick, decay);
            state.last_update_time = now.max(last);
        } else {
            // obsolete, only age the estimate
            state.last_value = decay_ticks(state.last_value, now - last, tick, decay);
            state.last_update_time = now.max(last);
        }

        (state.last_value, state.last_update_time)
    }

    pub fn tick_interval(&self) -> f64 {
        self.tick_interval
    }

    pub fn decay_factor(&self) -> f64 {
        self.decay_factor
    }

    pub fn state(&self) -> Option<SmootherState> {
        self.state
    }

    /// Forget the estimate; the next `predict` seeds again
    pub fn reset(&mut self) {
        self.state = None;
    }
}

impl Default for SpeedSmoother {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            decay_factor: DEFAULT_DECAY_FACTOR,
            state: None,
        }
    }
}

/// Number of decay steps for a gap of `elapsed` seconds:
/// `ceil((elapsed - tick) / tick)`, or 0 when the gap is at most one tick
pub fn decay_steps(elapsed: f64, tick: f64) -> u64 {
    if !(elapsed > tick) {
        return 0;
    }
    // saturating cast for absurd gaps
    ((elapsed - tick) / tick).ceil() as u64
}

fn decay_ticks(value: f64, elapsed: f64, tick: f64, decay: f64) -> f64 {
    match decay_steps(elapsed, tick) {
        0 => value,
        steps => value * (1.0 - decay).powf(steps as f64),
    }
}

fn blend(measured: f64, aged: f64, decay: f64) -> f64 {
    measured * decay + aged * (1.0 - decay)
}

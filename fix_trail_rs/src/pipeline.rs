//! Fix pipeline: gate, smooth and retain fixes, and tell observers about it.
//!
//! The pipeline is an ordinary owned value. Whoever owns it serializes calls;
//! events are delivered synchronously, in the order fixes are processed,
//! before `process` returns.

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::ConfigResult;
use crate::filters::{FixSmoother, GateDecision, QualityGate};
use crate::gradient::{GradientMapper, StyledTrack};
use crate::track::{FixTrack, Marker, TrackSource};
use crate::types::{Fix, Timestamp};

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// Every raw fix, with the gate's verdict
    GateDecided { fix: Fix, decision: GateDecision },
    /// A smoother produced a filtered fix
    Filtered {
        fix: Fix,
        source: TrackSource,
        smoother: &'static str,
    },
    /// Newest raw fix of a delivered batch
    RawUpdated { fix: Fix },
}

/// Receives pipeline events synchronously
pub trait FixObserver: Send {
    fn on_event(&mut self, event: &PipelineEvent);
}

impl<F> FixObserver for F
where
    F: FnMut(&PipelineEvent) + Send,
{
    fn on_event(&mut self, event: &PipelineEvent) {
        self(event)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub received: u64,
    pub accepted: u64,
    pub rejected_stale: u64,
    pub rejected_invalid_accuracy: u64,
    pub rejected_low_accuracy: u64,
}

impl PipelineStats {
    fn record(&mut self, decision: GateDecision) {
        self.received += 1;
        match decision {
            GateDecision::Accepted => self.accepted += 1,
            GateDecision::RejectedStale => self.rejected_stale += 1,
            GateDecision::RejectedInvalidAccuracy => self.rejected_invalid_accuracy += 1,
            GateDecision::RejectedLowAccuracy => self.rejected_low_accuracy += 1,
        }
    }
}

/// Result of pushing one raw fix through the pipeline
#[derive(Clone, Debug, PartialEq)]
pub struct Processed {
    pub decision: GateDecision,
    pub filtered: Option<Fix>,
}

pub struct FixPipeline {
    gate: QualityGate,
    smoother: Box<dyn FixSmoother>,
    external: Option<Box<dyn FixSmoother>>,
    track: FixTrack,
    observers: Vec<Box<dyn FixObserver>>,
    subscribers: Vec<Sender<PipelineEvent>>,
    stats: PipelineStats,
}

impl FixPipeline {
    pub fn new(gate: QualityGate, smoother: Box<dyn FixSmoother>) -> Self {
        Self {
            gate,
            smoother,
            external: None,
            track: FixTrack::new(),
            observers: Vec::new(),
            subscribers: Vec::new(),
            stats: PipelineStats::default(),
        }
    }

    /// Pipeline as configured; drawing the external track attaches the Kalman smoother
    pub fn from_config(config: &PipelineConfig) -> ConfigResult<Self> {
        config.validate()?;
        let pipeline = Self::new(config.gate()?, Box::new(config.smoother()?));
        Ok(match config.external_smoother()? {
            Some(external) => pipeline.with_external(Box::new(external)),
            None => pipeline,
        })
    }

    /// Also run accepted fixes through a second smoother into the external track
    pub fn with_external(mut self, smoother: Box<dyn FixSmoother>) -> Self {
        self.external = Some(smoother);
        self
    }

    pub fn register(&mut self, observer: Box<dyn FixObserver>) {
        self.observers.push(observer);
    }

    /// Channel receiving a copy of every event; dropped receivers are pruned
    pub fn subscribe(&mut self) -> Receiver<PipelineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn process(&mut self, fix: Fix, now: Timestamp) -> Processed {
        self.track.push_raw(fix.clone());

        let decision = self.gate.accept(&fix, now);
        self.stats.record(decision);
        if decision.is_accepted() {
            log::debug!("Fix at {:.3} accepted", fix.timestamp);
        } else {
            log::debug!(
                "Fix at {:.3} rejected: {} (accuracy {:.1} m, age {:.1} s)",
                fix.timestamp,
                decision,
                fix.horizontal_accuracy,
                fix.age(now)
            );
        }
        self.emit(PipelineEvent::GateDecided {
            fix: fix.clone(),
            decision,
        });

        if !decision.is_accepted() {
            return Processed {
                decision,
                filtered: None,
            };
        }

        let filtered = self.smoother.smooth(&fix, now);
        self.track.push_filtered(filtered.clone());
        self.emit(PipelineEvent::Filtered {
            fix: filtered.clone(),
            source: TrackSource::Filtered,
            smoother: self.smoother.name(),
        });

        if let Some(external) = self.external.as_mut() {
            let alternative = external.smooth(&fix, now);
            let name = external.name();
            self.track.push_external(alternative.clone());
            self.emit(PipelineEvent::Filtered {
                fix: alternative,
                source: TrackSource::External,
                smoother: name,
            });
        }

        Processed {
            decision,
            filtered: Some(filtered),
        }
    }

    /// Process a delivery batch in order, then announce its newest fix
    pub fn process_batch(&mut self, fixes: Vec<Fix>, now: Timestamp) -> Vec<Processed> {
        let last = fixes.last().cloned();
        let results: Vec<Processed> = fixes
            .into_iter()
            .map(|fix| self.process(fix, now))
            .collect();
        if let Some(fix) = last {
            self.emit(PipelineEvent::RawUpdated { fix });
        }
        results
    }

    fn emit(&mut self, event: PipelineEvent) {
        for observer in self.observers.iter_mut() {
            observer.on_event(&event);
        }
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn track(&self) -> &FixTrack {
        &self.track
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Newest filtered fix, if any fix was accepted
    pub fn latest_filtered(&self) -> Option<&Fix> {
        self.track.filtered().last()
    }

    /// Marker for the newest raw fix
    pub fn marker(&self) -> Option<Marker> {
        self.track.raw().last().map(Marker::for_fix)
    }

    pub fn style(&self, mapper: &GradientMapper, source: TrackSource) -> StyledTrack {
        mapper.style(self.track.get(source))
    }

    /// Forget history and smoother state; observers stay registered
    pub fn reset(&mut self) {
        self.track.clear();
        self.smoother.reset();
        if let Some(external) = self.external.as_mut() {
            external.reset();
        }
        self.stats = PipelineStats::default();
        log::info!("Fix pipeline reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::tests::MeanSpeed;
    use crate::filters::{EmaFixSmoother, ExternalFilter};
    use crate::types::Coordinate;
    use approx::assert_abs_diff_eq;
    use std::sync::{Arc, Mutex};

    fn fix(speed: f64, accuracy: f64, timestamp: f64) -> Fix {
        Fix::new(Coordinate::new(41.887, -87.622), accuracy, speed, timestamp)
    }

    fn pipeline() -> FixPipeline {
        FixPipeline::new(
            QualityGate::default(),
            Box::new(EmaFixSmoother::new(1.0, 0.5, 5.0).unwrap()),
        )
    }

    #[test]
    fn test_rejected_fixes_only_reach_raw_track() {
        let mut pipeline = pipeline();
        let result = pipeline.process(fix(3.0, 80.0, 100.0), 100.5);

        assert_eq!(result.decision, GateDecision::RejectedLowAccuracy);
        assert!(result.filtered.is_none());
        assert_eq!(pipeline.track().raw().len(), 1);
        assert!(pipeline.track().filtered().is_empty());
        assert_eq!(pipeline.stats().rejected_low_accuracy, 1);
    }

    #[test]
    fn test_accepted_fixes_are_smoothed() {
        let mut pipeline = pipeline();
        pipeline.process(fix(4.0, 5.0, 100.0), 100.1);
        let result = pipeline.process(fix(8.0, 5.0, 100.5), 100.6);

        let filtered = result.filtered.unwrap();
        assert_abs_diff_eq!(filtered.speed, 6.0, epsilon = 1e-12);
        assert_eq!(pipeline.track().filtered().len(), 2);
        assert_eq!(pipeline.latest_filtered(), Some(&filtered));
        assert_eq!(pipeline.stats().accepted, 2);
    }

    #[test]
    fn test_unknown_speed_enters_as_zero() {
        let mut pipeline = pipeline();
        let result = pipeline.process(fix(-1.0, 5.0, 100.0), 100.0);
        assert_eq!(result.filtered.unwrap().speed, 0.0);
    }

    #[test]
    fn test_observers_see_events_in_order() {
        let seen: Arc<Mutex<Vec<PipelineEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut pipeline = pipeline();
        pipeline.register(Box::new(move |event: &PipelineEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        pipeline.process_batch(
            vec![fix(1.0, -1.0, 100.0), fix(2.0, 5.0, 100.2)],
            100.3,
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(matches!(
            seen[0],
            PipelineEvent::GateDecided {
                decision: GateDecision::RejectedInvalidAccuracy,
                ..
            }
        ));
        assert!(matches!(
            seen[1],
            PipelineEvent::GateDecided {
                decision: GateDecision::Accepted,
                ..
            }
        ));
        assert!(matches!(
            seen[2],
            PipelineEvent::Filtered {
                source: TrackSource::Filtered,
                smoother: "ema",
                ..
            }
        ));
        match &seen[3] {
            PipelineEvent::RawUpdated { fix } => assert_eq!(fix.timestamp, 100.2),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_channel_subscribers() {
        let mut pipeline = pipeline();
        let rx = pipeline.subscribe();
        let dropped = pipeline.subscribe();
        drop(dropped);

        pipeline.process(fix(2.0, 5.0, 100.0), 100.0);

        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(pipeline.subscribers.len(), 1);
    }

    #[test]
    fn test_external_track() {
        let mut pipeline = pipeline().with_external(Box::new(ExternalFilter::new(MeanSpeed, "mean")));
        pipeline.process(fix(2.0, 5.0, 100.0), 100.0);
        pipeline.process(fix(4.0, 5.0, 100.5), 100.5);

        let external = pipeline.track().get(TrackSource::External);
        assert_eq!(external.len(), 2);
        assert_eq!(external[1].speed, 3.0);
    }

    #[test]
    fn test_marker_follows_newest_raw_fix() {
        let mut pipeline = pipeline();
        assert!(pipeline.marker().is_none());

        pipeline.process(fix(2.0, 120.0, 100.0), 100.0);
        let marker = pipeline.marker().unwrap();
        assert_eq!(marker.radius, 120.0);
    }

    #[test]
    fn test_style_selected_source() {
        let mut pipeline = pipeline();
        pipeline.process(fix(2.0, 5.0, 100.0), 100.0);
        pipeline.process(fix(2.0, 90.0, 100.5), 100.5);
        pipeline.process(fix(3.0, 5.0, 101.0), 101.0);

        let mapper = GradientMapper::default();
        assert_eq!(pipeline.style(&mapper, TrackSource::Raw).segments.len(), 2);
        assert_eq!(pipeline.style(&mapper, TrackSource::Filtered).segments.len(), 1);
    }

    #[test]
    fn test_reset() {
        let mut pipeline = pipeline();
        pipeline.process(fix(9.0, 5.0, 100.0), 100.0);
        pipeline.reset();

        assert!(pipeline.track().raw().is_empty());
        assert_eq!(pipeline.stats(), PipelineStats::default());
        let result = pipeline.process(fix(1.0, 5.0, 200.0), 200.0);
        assert_eq!(result.filtered.unwrap().speed, 1.0);
    }

    #[test]
    fn test_from_config_external_track_is_filled() {
        let config = PipelineConfig {
            track_source: TrackSource::External,
            ..Default::default()
        };
        let mut pipeline = FixPipeline::from_config(&config).unwrap();
        pipeline.process(fix(2.0, 5.0, 100.0), 100.0);
        pipeline.process(fix(4.0, 5.0, 101.0), 101.0);

        assert_eq!(pipeline.track().external().len(), 2);
        let mapper = config.mapper().unwrap();
        assert_eq!(pipeline.style(&mapper, TrackSource::External).segments.len(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = PipelineConfig::default();
        let mut pipeline = FixPipeline::from_config(&config).unwrap();
        let result = pipeline.process(fix(3.0, 5.0, 10.0), 12.0);
        assert!(result.decision.is_accepted());
    }
}

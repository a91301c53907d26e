//! Location fix filtering and trajectory styling.
//!
//! Raw fixes pass a quality gate, accepted ones get a time-aware smoothed
//! speed, and any fix sequence can be turned into hue/width gradient
//! segments for drawing.

pub mod config;
pub mod error;
pub mod filters;
pub mod gradient;
pub mod live_status;
pub mod location_source;
pub mod pipeline;
pub mod storage;
pub mod track;
pub mod types;

pub use config::PipelineConfig;
pub use error::{ConfigError, ConfigResult};
pub use filters::{
    EmaFixSmoother, ExternalFilter, FixSmoother, GateDecision, KalmanSpeedFilter, QualityGate,
    SpeedSmoother, StepFilter,
};
pub use gradient::{map_hue, map_width, GradientMapper, GradientSpec, StyledTrack, WidthPolicy};
pub use pipeline::{FixObserver, FixPipeline, PipelineEvent, Processed};
pub use track::{FixTrack, Marker, TrackSource};
pub use types::{Coordinate, Fix, Timestamp};

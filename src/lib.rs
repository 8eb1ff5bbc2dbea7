//! PDR / absolute-fix fusion and anchor alignment
//!
//! Pedestrian dead-reckoning drifts; GNSS and WiFi fixes are noisy and
//! sparse; surveyed calibration anchors are exact but rarer still. This crate
//! combines the three into a geo-referenced trajectory suitable as training
//! labels for indoor positioning:
//!
//! - [`filters::ekf_2d`]: 2-state EKF, PDR deltas in, gated fixes as corrections
//! - [`alignment`]: weighted Procrustes, anchor clustering, piecewise and
//!   global similarity alignment
//! - [`pipeline`]: the fused and label orderings of those stages
//!
//! All stages operate on a timestamp-sorted `&mut [Record]` in place.

pub mod alignment;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod filters;
pub mod geodesy;
pub mod io;
pub mod pipeline;
pub mod preprocess;
pub mod types;

pub use config::{AlignmentConfig, FusionConfig, PipelineConfig, StandstillConfig};
pub use error::{FusionError, Result};
pub use geodesy::{LocalFrame, Projection, ScaleConvention};
pub use types::{FixSource, Record, TrackField};

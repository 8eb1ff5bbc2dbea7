//! Anchor-based trajectory alignment
//!
//! - `similarity`: weighted Procrustes solver shared by both passes
//! - `clustering`: dwell-collapsing of repeated anchors
//! - `piecewise`: one transform per inter-anchor segment
//! - `global`: one transform for the whole session

pub mod clustering;
pub mod global;
pub mod piecewise;
pub mod similarity;

pub use clustering::{cluster_anchors, collect_anchors, AnchorCluster, AnchorObservation};
pub use global::{align_global, GlobalOutput};
pub use piecewise::{align_piecewise, SegmentSummary, SegmentTransform};
pub use similarity::{SimilarityTransform, TransformSummary};

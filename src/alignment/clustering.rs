//! Anchor clustering
//!
//! A user standing at a calibration point for a while produces many
//! near-identical anchor records. Left alone they would dominate a
//! least-squares fit, so anchors whose surveyed positions fall within
//! `dist_thresh` of an existing cluster are folded into it.

use crate::geodesy::Projection;
use crate::types::{Record, TrackField, Vec2};

/// One calibration observation in the local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorObservation {
    /// Surveyed position
    pub truth: Vec2,
    /// Position the trajectory being aligned puts the user at
    pub predicted: Vec2,
    pub weight: f64,
}

/// Weighted centroid of one or more anchor observations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorCluster {
    pub truth: Vec2,
    pub predicted: Vec2,
    /// Sum of member weights
    pub weight: f64,
    pub members: usize,
}

struct ClusterSum {
    truth: Vec2,
    predicted: Vec2,
    weight: f64,
    members: usize,
}

impl ClusterSum {
    fn centroid(&self) -> Vec2 {
        self.truth / self.weight
    }
}

/// Gather anchors with a surveyed position from `records`.
///
/// Anchors lacking the surveyed position or the `field` coordinates are
/// skipped, as are anchors with a non-positive weight.
pub fn collect_anchors<P: Projection>(
    records: &[Record],
    field: TrackField,
    projection: &P,
    default_weight: f64,
) -> Vec<AnchorObservation> {
    records
        .iter()
        .filter(|r| r.is_calibration)
        .filter_map(|r| {
            let (lat, lng) = r.true_position()?;
            let predicted = r.position(field)?;
            let weight = r.calib_weight_or(default_weight);
            if !(weight > 0.0 && weight.is_finite()) {
                log::debug!("Skipping anchor at t={} with weight {}", r.timestamp, weight);
                return None;
            }
            Some(AnchorObservation {
                truth: projection.to_local(lat, lng),
                predicted,
                weight,
            })
        })
        .collect()
}

/// Greedy, order-dependent clustering.
///
/// Each anchor joins the first existing cluster whose weighted truth
/// centroid lies within `dist_thresh`, otherwise it starts a new cluster.
/// A non-positive threshold disables merging. O(k²) in the anchor count.
pub fn cluster_anchors(anchors: &[AnchorObservation], dist_thresh: f64) -> Vec<AnchorCluster> {
    let mut sums: Vec<ClusterSum> = Vec::new();

    for anchor in anchors {
        let existing = if dist_thresh > 0.0 {
            sums.iter_mut()
                .find(|c| (c.centroid() - anchor.truth).norm() <= dist_thresh)
        } else {
            None
        };

        match existing {
            Some(cluster) => {
                cluster.truth += anchor.truth * anchor.weight;
                cluster.predicted += anchor.predicted * anchor.weight;
                cluster.weight += anchor.weight;
                cluster.members += 1;
            }
            None => sums.push(ClusterSum {
                truth: anchor.truth * anchor.weight,
                predicted: anchor.predicted * anchor.weight,
                weight: anchor.weight,
                members: 1,
            }),
        }
    }

    sums.into_iter()
        .map(|c| AnchorCluster {
            truth: c.truth / c.weight,
            predicted: c.predicted / c.weight,
            weight: c.weight,
            members: c.members,
        })
        .collect()
}

//! Whole-trajectory alignment from clustered anchors
//!
//! One weighted similarity transform for the entire session. Coarser than
//! the piecewise pass but stable with few anchors, which is why the fused
//! pipeline runs it on both sides of the EKF.

use serde::{Deserialize, Serialize};

use super::clustering::{cluster_anchors, collect_anchors};
use super::similarity::SimilarityTransform;
use crate::config::AlignmentConfig;
use crate::geodesy::Projection;
use crate::types::{Record, TrackField, Vec2};

/// Where the aligned coordinates go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalOutput {
    /// Overwrite the aligned field in place
    Local,
    /// Leave the field alone, write `ekfLat_aligned`/`ekfLng_aligned`
    #[default]
    LatLon,
}

/// Fit one transform from clustered anchors and apply it to every record.
///
/// Returns `None`, with records untouched, when clustering leaves fewer than
/// two anchors.
pub fn align_global<P: Projection>(
    records: &mut [Record],
    field: TrackField,
    projection: &P,
    config: &AlignmentConfig,
    output: GlobalOutput,
) -> Option<SimilarityTransform> {
    let anchors = collect_anchors(records, field, projection, config.default_weight);
    let clusters = cluster_anchors(&anchors, config.dist_thresh);
    log::debug!(
        "Global alignment on {:?}: {} anchors in {} clusters",
        field,
        anchors.len(),
        clusters.len()
    );

    if clusters.len() < 2 {
        log::warn!(
            "Global alignment skipped: {} anchor cluster(s) after clustering",
            clusters.len()
        );
        return None;
    }

    let source: Vec<Vec2> = clusters.iter().map(|c| c.predicted).collect();
    let target: Vec<Vec2> = clusters.iter().map(|c| c.truth).collect();
    let weights: Vec<f64> = clusters.iter().map(|c| c.weight).collect();
    let transform = SimilarityTransform::fit(&source, &target, Some(weights.as_slice()))?;

    for record in records.iter_mut() {
        let Some(p) = record.position(field) else {
            continue;
        };
        let aligned = transform.apply(&p);
        match output {
            GlobalOutput::Local => record.set_position(field, &aligned),
            GlobalOutput::LatLon => {
                let (lat, lng) = projection.to_latlon(&aligned);
                record.ekf_lat_aligned = Some(lat);
                record.ekf_lng_aligned = Some(lng);
            }
        }
    }

    log::info!(
        "Global alignment: scale={:.4} rot={:.2}° t=({:.2}, {:.2}) over {} clusters",
        transform.scale,
        transform.rotation_angle().to_degrees(),
        transform.translation.x,
        transform.translation.y,
        clusters.len()
    );

    Some(transform)
}

//! Anchor residuals: how far a trajectory lands from the surveyed points

use geo::{HaversineDistance, Point};
use serde::Serialize;

use crate::geodesy::Projection;
use crate::types::{Record, TrackField};

/// Trajectory to score against the anchors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalTrack {
    /// A local field, projected to lat/lon
    Local(TrackField),
    /// `ekfLat_aligned`/`ekfLng_aligned`, falling back to `ekfLat`/`ekfLng`
    EkfAligned,
    /// `alignedLat`/`alignedLng`
    Labels,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ResidualSummary {
    pub count: usize,
    pub mean_m: f64,
    pub rmse_m: f64,
    pub max_m: f64,
}

fn track_latlon<P: Projection>(
    record: &Record,
    track: EvalTrack,
    projection: &P,
) -> Option<(f64, f64)> {
    match track {
        EvalTrack::Local(field) => record.position(field).map(|p| projection.to_latlon(&p)),
        EvalTrack::EkfAligned => match (record.ekf_lat_aligned, record.ekf_lng_aligned) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => Some((record.ekf_lat?, record.ekf_lng?)),
        },
        EvalTrack::Labels => Some((record.aligned_lat?, record.aligned_lng?)),
    }
}

/// Great-circle distance (m) from each surveyed anchor to `track`.
///
/// Anchors without a surveyed position or without the track are skipped.
pub fn anchor_residuals<P: Projection>(
    records: &[Record],
    track: EvalTrack,
    projection: &P,
) -> Vec<f64> {
    records
        .iter()
        .filter(|r| r.is_calibration)
        .filter_map(|r| {
            let (true_lat, true_lng) = r.true_position()?;
            let (lat, lng) = track_latlon(r, track, projection)?;
            let truth = Point::new(true_lng, true_lat);
            Some(truth.haversine_distance(&Point::new(lng, lat)))
        })
        .collect()
}

pub fn rmse(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return f64::INFINITY;
    }
    let sum_sq: f64 = residuals.iter().map(|d| d * d).sum();
    (sum_sq / residuals.len() as f64).sqrt()
}

/// `None` when there is nothing to score.
pub fn summarize(residuals: &[f64]) -> Option<ResidualSummary> {
    if residuals.is_empty() {
        return None;
    }
    let count = residuals.len();
    Some(ResidualSummary {
        count,
        mean_m: residuals.iter().sum::<f64>() / count as f64,
        rmse_m: rmse(residuals),
        max_m: residuals.iter().cloned().fold(0.0, f64::max),
    })
}

//! End-to-end session processing
//!
//! Two orderings of the same stages:
//! - `run_fused`: global alignment, EKF, global alignment again. Produces
//!   `ekfLat_aligned`/`ekfLng_aligned` for every record.
//! - `run_labels`: piecewise alignment (optionally refined through the EKF),
//!   trimmed to the anchored span. Produces `alignedLat`/`alignedLng`
//!   training labels.

use serde::Serialize;
use serde_json::json;

use crate::alignment::{
    align_global, align_piecewise, GlobalOutput, SegmentSummary, TransformSummary,
};
use crate::config::PipelineConfig;
use crate::error::{FusionError, Result};
use crate::evaluation::{anchor_residuals, summarize, EvalTrack, ResidualSummary};
use crate::filters::{fuse_records, Ekf2dState};
use crate::geodesy::{LocalFrame, Projection, ScaleConvention};
use crate::preprocess::{
    filter_unique_wifi, find_origin, snap_standstill_near_anchors, snapshot_raw_pdr,
};
use crate::types::{anchor_indices, sort_by_timestamp, Record, TrackField, Vec2};

#[derive(Clone, Debug, Serialize)]
pub struct FusedReport {
    pub origin: LocalFrame,
    pub records: usize,
    pub wifi_duplicates_removed: usize,
    pub standstill_snapped: usize,
    pub pre_fusion: Option<TransformSummary>,
    pub ekf: Ekf2dState,
    pub post_fusion: Option<TransformSummary>,
    pub anchor_error: Option<ResidualSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LabelReport {
    pub origin: LocalFrame,
    pub input_records: usize,
    /// Records left after trimming to the anchored span; 0 means no labels
    pub labeled_records: usize,
    pub wifi_duplicates_removed: usize,
    pub standstill_snapped: usize,
    pub segments: Vec<SegmentSummary>,
    pub ekf: Option<Ekf2dState>,
    pub refined_segments: Vec<SegmentSummary>,
    pub anchor_error: Option<ResidualSummary>,
}

/// Shared front half: order, dedup, origin, raw snapshot, standstill.
fn prepare(
    records: &mut Vec<Record>,
    config: &PipelineConfig,
) -> Result<(LocalFrame, usize, usize)> {
    config.validate()?;
    sort_by_timestamp(records);

    let removed = match config.wifi_dedup_tolerance {
        Some(tol) => filter_unique_wifi(records, tol),
        None => 0,
    };

    let origin = find_origin(records, config.fusion.fix_source, config.scale_convention)
        .ok_or(FusionError::NoOrigin)?;
    log::info!(
        "Origin ({:?}): lat={:.7} lon={:.7}",
        config.fusion.fix_source,
        origin.lat0,
        origin.lon0
    );

    snapshot_raw_pdr(records);
    let snapped = if config.standstill.enabled {
        snap_standstill_near_anchors(records, TrackField::Pdr, &config.standstill)
    } else {
        0
    };

    Ok((origin, removed, snapped))
}

/// Align PDR globally, fuse it with absolute fixes, then align the fused track.
pub fn run_fused(records: &mut Vec<Record>, config: &PipelineConfig) -> Result<FusedReport> {
    let (origin, removed, snapped) = prepare(records, config)?;

    // Aligned output from an earlier run must not leak into the motion input
    for r in records.iter_mut() {
        let pdr = Vec2::new(r.pdr_x, r.pdr_y);
        r.set_position(TrackField::EkfLocal, &pdr);
        r.ekf_lat_aligned = None;
        r.ekf_lng_aligned = None;
    }
    let pre = align_global(
        records,
        TrackField::EkfLocal,
        &origin,
        &config.pre_fusion_alignment,
        GlobalOutput::LatLon,
    );

    // Aligned PDR becomes the motion input of the filter
    for r in records.iter_mut() {
        if let (Some(lat), Some(lng)) = (r.ekf_lat_aligned.take(), r.ekf_lng_aligned.take()) {
            let p = origin.to_local(lat, lng);
            r.pdr_x = p.x;
            r.pdr_y = p.y;
        }
    }

    let ekf = fuse_records(records, &origin, &config.fusion);

    let post = align_global(
        records,
        TrackField::EkfLocal,
        &origin,
        &config.post_fusion_alignment,
        GlobalOutput::LatLon,
    );

    let anchor_error = summarize(&anchor_residuals(records, EvalTrack::EkfAligned, &origin));
    if let Some(err) = &anchor_error {
        log::info!(
            "Fused anchor error: mean={:.2} m rmse={:.2} m over {} anchors",
            err.mean_m,
            err.rmse_m,
            err.count
        );
    }

    Ok(FusedReport {
        origin,
        records: records.len(),
        wifi_duplicates_removed: removed,
        standstill_snapped: snapped,
        pre_fusion: pre.map(|t| t.summary()),
        ekf,
        post_fusion: post.map(|t| t.summary()),
        anchor_error,
    })
}

/// Build training labels from one session.
///
/// On return `records` holds only the anchored span, each record carrying
/// `alignedLat/Lng`, `rawLat/Lng` and its session origin (`fileLat0/Lon0`).
/// A session with fewer than two anchors is emptied and reported with
/// `labeled_records == 0`.
pub fn run_labels(records: &mut Vec<Record>, config: &PipelineConfig) -> Result<LabelReport> {
    let input_records = records.len();
    let (origin, removed, snapped) = prepare(records, config)?;

    let segments = align_piecewise(records, TrackField::Pdr, &origin, &config.label_alignment);

    let (track, ekf, refined) = if config.refine_labels_with_ekf {
        let state = fuse_records(records, &origin, &config.fusion);
        let refined =
            align_piecewise(records, TrackField::EkfLocal, &origin, &config.label_alignment);
        (TrackField::EkfLocal, Some(state), refined)
    } else {
        (TrackField::Pdr, None, Vec::new())
    };

    let anchors = anchor_indices(records);
    let (first, last) = match (anchors.first(), anchors.last()) {
        (Some(&first), Some(&last)) if anchors.len() >= 2 => (first, last),
        _ => {
            log::warn!(
                "{} anchor(s) in session; no labels produced",
                anchors.len()
            );
            records.clear();
            return Ok(LabelReport {
                origin,
                input_records,
                labeled_records: 0,
                wifi_duplicates_removed: removed,
                standstill_snapped: snapped,
                segments: Vec::new(),
                ekf,
                refined_segments: Vec::new(),
                anchor_error: None,
            });
        }
    };

    records.truncate(last + 1);
    records.drain(..first);

    for r in records.iter_mut() {
        let aligned = r
            .position(track)
            .unwrap_or_else(|| Vec2::new(r.pdr_x, r.pdr_y));
        let (lat, lng) = origin.to_latlon(&aligned);
        r.aligned_lat = Some(lat);
        r.aligned_lng = Some(lng);

        let raw = Vec2::new(r.raw_pdr_x.unwrap_or(r.pdr_x), r.raw_pdr_y.unwrap_or(r.pdr_y));
        let (raw_lat, raw_lng) = origin.to_latlon(&raw);
        r.raw_lat = Some(raw_lat);
        r.raw_lng = Some(raw_lng);

        r.extra.insert("fileLat0".to_string(), json!(origin.lat0));
        r.extra.insert("fileLon0".to_string(), json!(origin.lon0));
    }

    let anchor_error = summarize(&anchor_residuals(records, EvalTrack::Labels, &origin));
    log::info!(
        "Labels: {} of {} records in anchored span, {} segments",
        records.len(),
        input_records,
        segments.len()
    );

    Ok(LabelReport {
        origin,
        input_records,
        labeled_records: records.len(),
        wifi_duplicates_removed: removed,
        standstill_snapped: snapped,
        segments: segments.iter().map(|s| s.summary()).collect(),
        ekf,
        refined_segments: refined.iter().map(|s| s.summary()).collect(),
        anchor_error,
    })
}

/// Re-express labels from several sessions in one shared local frame.
///
/// The shared origin is the first anchor's label, or the first record's when
/// no anchor survives. `pdrX/Y` become the label in that frame and
/// `rawPdrX/Y` the raw track in that frame. Records without a label are
/// left as they are. Returns `None` when there is no label at all.
pub fn unify_labels(records: &mut [Record], convention: ScaleConvention) -> Option<LocalFrame> {
    let labeled = |r: &Record| Some((r.aligned_lat?, r.aligned_lng?));
    let (lat0, lon0) = records
        .iter()
        .filter(|r| r.is_calibration)
        .find_map(labeled)
        .or_else(|| records.iter().find_map(labeled))?;
    let frame = LocalFrame::new(lat0, lon0).with_convention(convention);

    for r in records.iter_mut() {
        if let Some((lat, lng)) = labeled(r) {
            let p = frame.to_local(lat, lng);
            r.pdr_x = p.x;
            r.pdr_y = p.y;
        }
        if let (Some(lat), Some(lng)) = (r.raw_lat, r.raw_lng) {
            let p = frame.to_local(lat, lng);
            r.raw_pdr_x = Some(p.x);
            r.raw_pdr_y = Some(p.y);
        }
    }
    Some(frame)
}

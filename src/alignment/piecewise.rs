//! Piecewise drift correction between consecutive anchors
//!
//! Each segment `[a_k, a_{k+1}]` gets its own similarity transform, fit on
//! the anchors at both ends and applied to `[a_k, a_{k+1})`. The closing
//! anchor belongs to the next segment, so every record is rewritten at most
//! once. Records after the last anchor are never touched.

use serde::Serialize;

use super::similarity::{SimilarityTransform, TransformSummary};
use crate::config::AlignmentConfig;
use crate::geodesy::Projection;
use crate::types::{anchor_indices, sort_by_timestamp, Record, TrackField, Vec2};

/// Transform fit for the records between two anchor indices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentTransform {
    pub start: usize,
    /// Exclusive for the apply step, inclusive for the fit
    pub end: usize,
    pub transform: SimilarityTransform,
}

#[derive(Clone, Debug, Serialize)]
pub struct SegmentSummary {
    pub start: usize,
    pub end: usize,
    #[serde(flatten)]
    pub transform: TransformSummary,
}

impl SegmentTransform {
    pub fn summary(&self) -> SegmentSummary {
        SegmentSummary {
            start: self.start,
            end: self.end,
            transform: self.transform.summary(),
        }
    }
}

/// Align `field` of `records` segment by segment against surveyed anchors.
///
/// Sorts `records` by timestamp first. With fewer than two anchors nothing
/// changes and the result is empty. Segments without two usable anchors are
/// skipped with a warning and keep their input coordinates.
pub fn align_piecewise<P: Projection>(
    records: &mut [Record],
    field: TrackField,
    projection: &P,
    config: &AlignmentConfig,
) -> Vec<SegmentTransform> {
    sort_by_timestamp(records);

    let anchors = anchor_indices(records);
    log::debug!("Piecewise alignment on {:?}: {} anchors", field, anchors.len());
    if anchors.len() < 2 {
        log::info!(
            "Only {} anchor(s); piecewise alignment skipped",
            anchors.len()
        );
        return Vec::new();
    }
    if config.smoothing_count > 0 {
        log::debug!("smoothing_count={} ignored", config.smoothing_count);
    }

    let mut segments = Vec::with_capacity(anchors.len() - 1);

    for (seg_idx, pair) in anchors.windows(2).enumerate() {
        let (mut start, mut end) = (pair[0], pair[1]);
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }

        let (source, target): (Vec<Vec2>, Vec<Vec2>) = records[start..=end]
            .iter()
            .filter(|r| r.is_calibration)
            .filter_map(|r| {
                let (lat, lng) = r.true_position()?;
                let predicted = r.position(field)?;
                Some((predicted, projection.to_local(lat, lng)))
            })
            .unzip();

        if source.len() < 2 {
            log::warn!(
                "Segment {} [{}, {}): {} usable anchor(s), left unaligned",
                seg_idx,
                start,
                end,
                source.len()
            );
            continue;
        }

        let Some(transform) = SimilarityTransform::fit(&source, &target, None) else {
            log::warn!("Segment {} [{}, {}): fit failed, left unaligned", seg_idx, start, end);
            continue;
        };

        for record in &mut records[start..end] {
            if let Some(p) = record.position(field) {
                record.set_position(field, &transform.apply(&p));
            }
        }

        log::debug!(
            "Segment {} [{}, {}): scale={:.4} rot={:.2}° residual={:.3} m",
            seg_idx,
            start,
            end,
            transform.scale,
            transform.rotation_angle().to_degrees(),
            transform.rms_residual(&source, &target)
        );

        segments.push(SegmentTransform {
            start,
            end,
            transform,
        });
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::LocalFrame;
    use nalgebra::Rotation2;

    const LAT0: f64 = 40.0;
    const LON0: f64 = 116.0;

    fn frame() -> LocalFrame {
        LocalFrame::new(LAT0, LON0)
    }

    /// Mark `record` as an anchor surveyed at local `truth`.
    fn make_anchor(record: &mut Record, frame: &LocalFrame, truth: Vec2) {
        let (lat, lng) = frame.to_latlon(&truth);
        record.is_calibration = true;
        record.user_lat = Some(lat);
        record.user_lng = Some(lng);
    }

    fn line(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(i as f64, i as f64, 0.0))
            .collect()
    }

    #[test]
    fn test_fewer_than_two_anchors_is_noop() {
        let frame = frame();
        let mut records = line(5);
        make_anchor(&mut records[2], &frame, Vec2::new(50.0, 50.0));
        let before = records.clone();

        let segments = align_piecewise(&mut records, TrackField::Pdr, &frame, &Default::default());
        assert!(segments.is_empty());
        assert_eq!(records, before);
    }

    #[test]
    fn test_segment_boundaries_are_exclusive() {
        let frame = frame();
        let mut records = line(25);
        // Truth along the x axis, so the origin-parallel projection is exact
        make_anchor(&mut records[0], &frame, Vec2::new(0.0, 0.0));
        make_anchor(&mut records[10], &frame, Vec2::new(20.0, 0.0));
        make_anchor(&mut records[20], &frame, Vec2::new(30.0, 0.0));

        let segments = align_piecewise(&mut records, TrackField::Pdr, &frame, &Default::default());

        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].start, segments[0].end), (0, 10));
        assert_eq!((segments[1].start, segments[1].end), (10, 20));
        assert!((segments[0].transform.scale - 2.0).abs() < 1e-6);
        assert!((segments[1].transform.scale - 1.0).abs() < 1e-6);

        // Index 10 is transformed exactly once, by the second segment
        assert!((records[10].pdr_x - 20.0).abs() < 1e-6);
        assert!((records[5].pdr_x - 10.0).abs() < 1e-6);
        assert!((records[15].pdr_x - 25.0).abs() < 1e-6);
        // The last anchor and everything after it stay raw
        assert_eq!(records[20].pdr_x, 20.0);
        assert_eq!(records[24].pdr_x, 24.0);
    }

    #[test]
    fn test_segment_with_single_usable_anchor_is_skipped() {
        let frame = frame();
        let mut records = line(25);
        make_anchor(&mut records[0], &frame, Vec2::new(0.0, 0.0));
        // Flagged but never surveyed
        records[10].is_calibration = true;
        make_anchor(&mut records[20], &frame, Vec2::new(40.0, 0.0));

        let segments = align_piecewise(&mut records, TrackField::Pdr, &frame, &Default::default());

        assert!(segments.is_empty());
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.pdr_x, i as f64);
        }
    }

    #[test]
    fn test_input_is_sorted_before_segmenting() {
        let frame = frame();
        let mut records = line(11);
        make_anchor(&mut records[0], &frame, Vec2::new(0.0, 0.0));
        make_anchor(&mut records[10], &frame, Vec2::new(0.0, 20.0));
        records.reverse();

        let segments = align_piecewise(&mut records, TrackField::Pdr, &frame, &Default::default());

        assert_eq!(segments.len(), 1);
        assert_eq!(records[0].timestamp, 0.0);
        // 90° rotation with scale 2: (5, 0) -> (0, 10)
        assert!(records[5].pdr_x.abs() < 1e-6);
        assert!((records[5].pdr_y - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_three_anchor_drift_is_removed() {
        // PDR walks a straight line east while the user actually walks an L:
        // 0..10 east, then 10..20 north. Anchors at 0, 10, 20.
        let frame = frame();
        let mut records = line(21);
        let truth = |i: usize| {
            if i <= 10 {
                Vec2::new(i as f64, 0.0)
            } else {
                Vec2::new(10.0, (i - 10) as f64)
            }
        };
        for i in [0, 10, 20] {
            make_anchor(&mut records[i], &frame, truth(i));
        }

        let segments = align_piecewise(&mut records, TrackField::Pdr, &frame, &Default::default());
        assert_eq!(segments.len(), 2);

        for i in 0..20 {
            let p = records[i].position(TrackField::Pdr).unwrap();
            let err = (p - truth(i)).norm();
            // Averaged-latitude projection costs a few mm off the parallel
            assert!(err < 0.01, "record {i}: error {err}");
        }
        // Final anchor keeps its raw position
        assert_eq!(records[20].pdr_x, 20.0);
        assert_eq!(records[20].pdr_y, 0.0);
    }

    /// Deterministic jitter in [-amplitude, amplitude] per axis.
    fn jitter(n: usize, amplitude: f64, seed: u64) -> Vec<Vec2> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 * amplitude - amplitude
        };
        (0..n).map(|_| Vec2::new(next(), next())).collect()
    }

    #[test]
    fn test_noisy_interior_error_bounded_by_noise() {
        let frame = frame();
        let truth = |i: usize| {
            if i <= 10 {
                Vec2::new(i as f64, 0.0)
            } else {
                Vec2::new(10.0, (i - 10) as f64)
            }
        };
        // Rotated and shifted PDR with jitter between the anchors
        let sigma = 0.3;
        let rot = Rotation2::new(-25f64.to_radians());
        let offset = Vec2::new(4.0, -3.0);
        let noise = jitter(21, sigma, 7);
        let mut records: Vec<Record> = (0..21)
            .map(|i| {
                let mut p = rot * truth(i) + offset;
                if i % 10 != 0 {
                    p += noise[i];
                }
                Record::new(i as f64, p.x, p.y)
            })
            .collect();
        for i in [0, 10, 20] {
            make_anchor(&mut records[i], &frame, truth(i));
        }

        let segments = align_piecewise(&mut records, TrackField::Pdr, &frame, &Default::default());
        assert_eq!(segments.len(), 2);
        for s in &segments {
            assert!((s.transform.scale - 1.0).abs() < 1e-3);
            assert!((s.transform.rotation_angle() - 25f64.to_radians()).abs() < 1e-3);
        }

        for i in [0, 10] {
            let err = (records[i].position(TrackField::Pdr).unwrap() - truth(i)).norm();
            assert!(err < 0.01, "anchor {i}: error {err}");
        }
        let bound = sigma * std::f64::consts::SQRT_2 + 0.01;
        let mut worst: f64 = 0.0;
        for i in (1..20).filter(|i| i % 10 != 0) {
            let err = (records[i].position(TrackField::Pdr).unwrap() - truth(i)).norm();
            assert!(err <= bound, "record {i}: error {err}");
            worst = worst.max(err);
        }
        // The jitter is actually present in the output
        assert!(worst > 0.05);
    }

    #[test]
    fn test_ekf_field_leaves_records_without_output() {
        let frame = frame();
        let mut records = line(11);
        make_anchor(&mut records[0], &frame, Vec2::new(0.0, 0.0));
        make_anchor(&mut records[10], &frame, Vec2::new(20.0, 0.0));
        for r in records.iter_mut().filter(|r| r.is_calibration || r.timestamp == 4.0) {
            let p = Vec2::new(r.pdr_x, r.pdr_y);
            r.set_position(TrackField::EkfLocal, &p);
        }

        let segments =
            align_piecewise(&mut records, TrackField::EkfLocal, &frame, &Default::default());

        assert_eq!(segments.len(), 1);
        assert!((records[4].ekf_local_x.unwrap() - 8.0).abs() < 1e-6);
        assert_eq!(records[3].ekf_local_x, None);
        // PDR untouched when aligning the EKF track
        assert_eq!(records[4].pdr_x, 4.0);
    }
}

//! Session clean-up applied before fusion and alignment

use crate::config::StandstillConfig;
use crate::geodesy::{LocalFrame, ScaleConvention};
use crate::types::{anchor_indices, sort_by_timestamp, FixSource, Record, TrackField};

/// First complete fix from `source`, as the local frame origin.
pub fn find_origin(
    records: &[Record],
    source: FixSource,
    convention: ScaleConvention,
) -> Option<LocalFrame> {
    records
        .iter()
        .find_map(|r| r.fix(source))
        .map(|(lat, lon)| LocalFrame::new(lat, lon).with_convention(convention))
}

/// Copy the current PDR into `rawPdrX/Y` so later passes can overwrite it.
pub fn snapshot_raw_pdr(records: &mut [Record]) {
    for r in records.iter_mut() {
        r.raw_pdr_x = Some(r.pdr_x);
        r.raw_pdr_y = Some(r.pdr_y);
    }
}

/// Drop consecutive repeats of the same WiFi fix.
///
/// A scan result is often reported several times before the next scan
/// completes. A record is dropped when both coordinates are within
/// `tolerance` degrees of the last kept WiFi fix. Anchors and records
/// without a WiFi fix are always kept. Returns the number removed.
pub fn filter_unique_wifi(records: &mut Vec<Record>, tolerance: f64) -> usize {
    let before = records.len();
    let mut last: Option<(f64, f64)> = None;

    records.retain(|r| {
        if r.is_calibration {
            return true;
        }
        let Some((lat, lon)) = r.fix(FixSource::Wifi) else {
            return true;
        };
        let repeat = last.is_some_and(|(last_lat, last_lon)| {
            (lat - last_lat).abs() <= tolerance && (lon - last_lon).abs() <= tolerance
        });
        if !repeat {
            last = Some((lat, lon));
        }
        !repeat
    });

    let removed = before - records.len();
    if removed > 0 {
        log::debug!("Dropped {} repeated WiFi fixes", removed);
    }
    removed
}

/// Pin standstill records around each anchor to the anchor's position.
///
/// Within `window` records on either side of an anchor, a record whose
/// `field` position lies closer than `dist_threshold` to the anchor's and
/// whose step counter differs by less than one step takes the anchor's
/// position. Another anchor inside the window is never rewritten, even
/// when it would qualify: its surveyed pairing stays as collected. Returns
/// the number snapped.
pub fn snap_standstill_near_anchors(
    records: &mut [Record],
    field: TrackField,
    config: &StandstillConfig,
) -> usize {
    sort_by_timestamp(records);
    let n = records.len();
    let mut snapped = 0;

    for anchor_idx in anchor_indices(records) {
        let anchor = &records[anchor_idx];
        let Some(anchor_pos) = anchor.position(field) else {
            continue;
        };
        let anchor_step = anchor.step_count();

        let lo = anchor_idx.saturating_sub(config.window);
        let hi = (anchor_idx + config.window).min(n.saturating_sub(1));

        for i in (lo..=hi).filter(|&i| i != anchor_idx) {
            let r = &mut records[i];
            if r.is_calibration {
                continue;
            }
            let Some(p) = r.position(field) else {
                continue;
            };
            let still = (r.step_count() - anchor_step).abs() < 1.0;
            if still && (p - anchor_pos).norm() < config.dist_threshold && p != anchor_pos {
                r.set_position(field, &anchor_pos);
                snapped += 1;
            }
        }
    }

    if snapped > 0 {
        log::debug!("Snapped {} standstill records onto anchors", snapped);
    }
    snapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec2;

    fn wifi(ts: f64, lat: f64, lon: f64) -> Record {
        let mut r = Record::new(ts, 0.0, 0.0);
        r.wifi_lat = Some(lat);
        r.wifi_lon = Some(lon);
        r
    }

    #[test]
    fn test_find_origin_uses_first_complete_fix() {
        let mut records = vec![Record::new(0.0, 0.0, 0.0), wifi(1.0, 10.0, 20.0)];
        records[0].gnss_lat = Some(1.0);
        records.push(Record::new(2.0, 0.0, 0.0));
        records[2].gnss_lat = Some(3.0);
        records[2].gnss_lon = Some(4.0);

        let gnss = find_origin(&records, FixSource::Gnss, ScaleConvention::default()).unwrap();
        assert_eq!((gnss.lat0, gnss.lon0), (3.0, 4.0));
        let wifi = find_origin(&records, FixSource::Wifi, ScaleConvention::OriginLatitude).unwrap();
        assert_eq!((wifi.lat0, wifi.lon0), (10.0, 20.0));
        assert_eq!(wifi.convention, ScaleConvention::OriginLatitude);

        assert!(find_origin(&records[..1], FixSource::Gnss, ScaleConvention::default()).is_none());
    }

    #[test]
    fn test_snapshot_raw_pdr() {
        let mut records = vec![Record::new(0.0, 1.5, -2.5)];
        snapshot_raw_pdr(&mut records);
        records[0].pdr_x = 9.0;
        assert_eq!(records[0].raw_pdr_x, Some(1.5));
        assert_eq!(records[0].raw_pdr_y, Some(-2.5));
    }

    #[test]
    fn test_filter_unique_wifi() {
        let mut anchor = wifi(3.0, 1.0, 1.0);
        anchor.is_calibration = true;
        let mut records = vec![
            wifi(0.0, 1.0, 1.0),
            wifi(1.0, 1.0, 1.0 + 5e-7),
            Record::new(2.0, 0.0, 0.0),
            anchor,
            wifi(4.0, 1.0, 1.0),
            wifi(5.0, 1.0, 1.001),
            wifi(6.0, 1.0, 1.0),
        ];

        let removed = filter_unique_wifi(&mut records, 1e-6);

        assert_eq!(removed, 2);
        let kept: Vec<f64> = records.iter().map(|r| r.timestamp).collect();
        assert_eq!(kept, vec![0.0, 2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_snap_standstill_near_anchors() {
        let mut records: Vec<Record> = (0..8)
            .map(|i| Record::new(i as f64, 10.0 + 0.05 * i as f64, 0.0))
            .collect();
        for r in records.iter_mut() {
            r.step_counter = Some(4.0);
        }
        records[3].is_calibration = true;
        // Walking away: a step taken
        records[5].step_counter = Some(5.0);
        // Outside the radius
        records[6].pdr_x = 10.4;
        records[7].pdr_x = 20.0;

        let config = StandstillConfig {
            enabled: true,
            window: 3,
            dist_threshold: 0.2,
        };
        let snapped = snap_standstill_near_anchors(&mut records, TrackField::Pdr, &config);

        let anchor_x = 10.0 + 0.05 * 3.0;
        assert_eq!(snapped, 4);
        for i in [0, 1, 2, 4] {
            assert_eq!(records[i].pdr_x, anchor_x, "record {i}");
        }
        assert_eq!(records[5].pdr_x, 10.0 + 0.05 * 5.0);
        assert_eq!(records[6].pdr_x, 10.4);
        assert_eq!(records[7].position(TrackField::Pdr), Some(Vec2::new(20.0, 0.0)));
    }

    #[test]
    fn test_standstill_leaves_neighbouring_anchor() {
        let mut records: Vec<Record> = (0..4)
            .map(|i| Record::new(i as f64, 5.0 + 0.01 * i as f64, 0.0))
            .collect();
        records[1].is_calibration = true;
        records[2].is_calibration = true;

        let config = StandstillConfig {
            enabled: true,
            window: 2,
            dist_threshold: 0.2,
        };
        let snapped = snap_standstill_near_anchors(&mut records, TrackField::Pdr, &config);

        // Both plain records end on the later anchor; the anchors stay put
        assert_eq!(snapped, 4);
        assert_eq!(records[1].pdr_x, 5.0 + 0.01);
        assert_eq!(records[2].pdr_x, 5.0 + 0.02);
        assert_eq!(records[0].pdr_x, records[2].pdr_x);
        assert_eq!(records[3].pdr_x, records[2].pdr_x);
    }
}

pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Absolute fix the EKF corrects with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixSource {
    #[default]
    Gnss,
    Wifi,
}

/// Pair of local coordinates an alignment pass reads and overwrites.
///
/// The same engine corrects raw PDR (`Pdr`) and fused output (`EkfLocal`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackField {
    #[default]
    Pdr,
    EkfLocal,
}

/// One timestamped observation of a collection session.
///
/// Field names on the wire are the camelCase keys the collection app writes.
/// Keys this struct does not know about (RSSI vectors, sensor dumps) are kept
/// in `extra` and written back untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub timestamp: f64,

    #[serde(default)]
    pub pdr_x: f64,
    #[serde(default)]
    pub pdr_y: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnss_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnss_lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_lon: Option<f64>,

    #[serde(default, deserialize_with = "null_as_false")]
    pub is_calibration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calib_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_counter: Option<f64>,

    /// PDR as collected, before any alignment pass overwrote it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_pdr_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_pdr_y: Option<f64>,

    // EKF output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ekf_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ekf_lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ekf_local_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ekf_local_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnss_used: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_used: Option<bool>,

    // Global alignment output
    #[serde(rename = "ekfLat_aligned", default, skip_serializing_if = "Option::is_none")]
    pub ekf_lat_aligned: Option<f64>,
    #[serde(rename = "ekfLng_aligned", default, skip_serializing_if = "Option::is_none")]
    pub ekf_lng_aligned: Option<f64>,

    // Label output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aligned_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aligned_lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_lng: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new(timestamp: f64, pdr_x: f64, pdr_y: f64) -> Self {
        Self {
            timestamp,
            pdr_x,
            pdr_y,
            ..Default::default()
        }
    }

    /// Local position stored in `field`, if the record carries it.
    ///
    /// PDR is always present (missing keys deserialize to 0.0); the EKF pair
    /// only exists once fusion or a seeding step has written it.
    pub fn position(&self, field: TrackField) -> Option<Vec2> {
        match field {
            TrackField::Pdr => Some(Vec2::new(self.pdr_x, self.pdr_y)),
            TrackField::EkfLocal => match (self.ekf_local_x, self.ekf_local_y) {
                (Some(x), Some(y)) => Some(Vec2::new(x, y)),
                _ => None,
            },
        }
    }

    pub fn set_position(&mut self, field: TrackField, position: &Vec2) {
        match field {
            TrackField::Pdr => {
                self.pdr_x = position.x;
                self.pdr_y = position.y;
            }
            TrackField::EkfLocal => {
                self.ekf_local_x = Some(position.x);
                self.ekf_local_y = Some(position.y);
            }
        }
    }

    /// Absolute fix `(lat, lon)` from `source`; both halves must be present.
    pub fn fix(&self, source: FixSource) -> Option<(f64, f64)> {
        let (lat, lon) = match source {
            FixSource::Gnss => (self.gnss_lat, self.gnss_lon),
            FixSource::Wifi => (self.wifi_lat, self.wifi_lon),
        };
        Some((lat?, lon?))
    }

    pub fn fix_used(&self, source: FixSource) -> Option<bool> {
        match source {
            FixSource::Gnss => self.gnss_used,
            FixSource::Wifi => self.wifi_used,
        }
    }

    pub fn set_fix_used(&mut self, source: FixSource, used: bool) {
        match source {
            FixSource::Gnss => self.gnss_used = Some(used),
            FixSource::Wifi => self.wifi_used = Some(used),
        }
    }

    /// Surveyed `(lat, lng)` of a calibration record.
    pub fn true_position(&self) -> Option<(f64, f64)> {
        Some((self.user_lat?, self.user_lng?))
    }

    pub fn calib_weight_or(&self, default_weight: f64) -> f64 {
        self.calib_weight.unwrap_or(default_weight)
    }

    pub fn step_count(&self) -> f64 {
        self.step_counter.unwrap_or(0.0)
    }
}

/// Stable in-place sort by timestamp; every stage assumes this order.
pub fn sort_by_timestamp(records: &mut [Record]) {
    records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
}

/// Indices of calibration records, in sequence order.
pub fn anchor_indices(records: &[Record]) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_calibration)
        .map(|(i, _)| i)
        .collect()
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_parses_collection_keys() {
        let line = r#"{"timestamp": 1700000000123, "pdrX": 1.5, "pdrY": -2.0,
            "gnssLat": 55.9, "gnssLon": -3.2, "isCalibration": true,
            "userLat": 55.91, "userLng": -3.21, "calibWeight": 20.0}"#;
        let record: Record = serde_json::from_str(line).unwrap();

        assert_eq!(record.timestamp, 1_700_000_000_123.0);
        assert_eq!(record.position(TrackField::Pdr), Some(Vec2::new(1.5, -2.0)));
        assert_eq!(record.fix(FixSource::Gnss), Some((55.9, -3.2)));
        assert_eq!(record.fix(FixSource::Wifi), None);
        assert!(record.is_calibration);
        assert_eq!(record.true_position(), Some((55.91, -3.21)));
        assert_eq!(record.calib_weight_or(1.0), 20.0);
    }

    #[test]
    fn test_missing_and_null_fields_default() {
        let record: Record =
            serde_json::from_str(r#"{"timestamp": 5, "isCalibration": null}"#).unwrap();
        assert!(!record.is_calibration);
        assert_eq!(record.pdr_x, 0.0);
        assert_eq!(record.position(TrackField::EkfLocal), None);
        assert_eq!(record.step_count(), 0.0);
    }

    #[test]
    fn test_half_fix_is_absent() {
        let mut record = Record::new(0.0, 0.0, 0.0);
        record.wifi_lat = Some(10.0);
        assert_eq!(record.fix(FixSource::Wifi), None);
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let line = r#"{"timestamp":1.0,"pdrX":0.0,"pdrY":0.0,"wifiList":[{"bssid":"aa","rssi":-60}]}"#;
        let record: Record = serde_json::from_str(line).unwrap();
        assert!(record.extra.contains_key("wifiList"));

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["wifiList"][0]["rssi"], -60);
        assert!(out.get("gnssLat").is_none());
    }

    #[test]
    fn test_aligned_keys_keep_underscore_names() {
        let mut record = Record::new(0.0, 0.0, 0.0);
        record.ekf_lat_aligned = Some(1.0);
        record.ekf_lng_aligned = Some(2.0);
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["ekfLat_aligned"], 1.0);
        assert_eq!(out["ekfLng_aligned"], 2.0);
    }

    #[test]
    fn test_set_position_selects_field() {
        let mut record = Record::new(0.0, 1.0, 2.0);
        record.set_position(TrackField::EkfLocal, &Vec2::new(3.0, 4.0));
        assert_eq!(record.position(TrackField::Pdr), Some(Vec2::new(1.0, 2.0)));
        assert_eq!(record.position(TrackField::EkfLocal), Some(Vec2::new(3.0, 4.0)));
    }

    #[test]
    fn test_sort_is_stable() {
        let mut records = vec![
            Record::new(2.0, 0.0, 0.0),
            Record::new(1.0, 1.0, 0.0),
            Record::new(1.0, 2.0, 0.0),
        ];
        sort_by_timestamp(&mut records);
        let xs: Vec<f64> = records.iter().map(|r| r.pdr_x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 0.0]);
    }
}

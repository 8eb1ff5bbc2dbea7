//! Local tangent-plane projection around a reference origin
//!
//! Equirectangular (flat-earth) approximation, good for a building or a
//! campus. `x` points east and `y` points north, both in meters.

use serde::{Deserialize, Serialize};

use crate::types::Vec2;

/// WGS-84 equatorial radius (m)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude used for the longitude scale factor.
///
/// `AveragedLatitude` scales the forward projection with the mean of the
/// point and origin latitudes while the inverse uses the origin latitude, so
/// the pair is only an exact inverse along the origin's parallel. It is the
/// default because previously generated labels were produced with it.
/// `OriginLatitude` uses the origin latitude both ways and round-trips exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleConvention {
    #[default]
    AveragedLatitude,
    OriginLatitude,
}

/// Convert lat/lon (degrees) to local x/y (meters) around `(lat0, lon0)`.
pub fn to_local(lat: f64, lon: f64, lat0: f64, lon0: f64) -> (f64, f64) {
    let d_lat = (lat - lat0).to_radians();
    let d_lon = (lon - lon0).to_radians();
    let lat_avg = ((lat + lat0) / 2.0).to_radians();
    let x = d_lon * EARTH_RADIUS_M * lat_avg.cos();
    let y = d_lat * EARTH_RADIUS_M;
    (x, y)
}

/// Convert local x/y (meters) back to lat/lon (degrees) around `(lat0, lon0)`.
pub fn to_latlon(x: f64, y: f64, lat0: f64, lon0: f64) -> (f64, f64) {
    let d_lat = y / EARTH_RADIUS_M;
    let d_lon = x / (EARTH_RADIUS_M * lat0.to_radians().cos());
    (lat0 + d_lat.to_degrees(), lon0 + d_lon.to_degrees())
}

fn to_local_origin_scaled(lat: f64, lon: f64, lat0: f64, lon0: f64) -> (f64, f64) {
    let d_lat = (lat - lat0).to_radians();
    let d_lon = (lon - lon0).to_radians();
    let x = d_lon * EARTH_RADIUS_M * lat0.to_radians().cos();
    let y = d_lat * EARTH_RADIUS_M;
    (x, y)
}

/// Coordinate projection used by fusion and alignment.
pub trait Projection {
    fn to_local(&self, lat: f64, lon: f64) -> Vec2;
    fn to_latlon(&self, local: &Vec2) -> (f64, f64);
}

/// Tangent plane anchored at one reference fix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalFrame {
    pub lat0: f64,
    pub lon0: f64,
    #[serde(default)]
    pub convention: ScaleConvention,
}

impl LocalFrame {
    pub fn new(lat0: f64, lon0: f64) -> Self {
        Self {
            lat0,
            lon0,
            convention: ScaleConvention::default(),
        }
    }

    pub fn with_convention(mut self, convention: ScaleConvention) -> Self {
        self.convention = convention;
        self
    }
}

impl Projection for LocalFrame {
    fn to_local(&self, lat: f64, lon: f64) -> Vec2 {
        let (x, y) = match self.convention {
            ScaleConvention::AveragedLatitude => to_local(lat, lon, self.lat0, self.lon0),
            ScaleConvention::OriginLatitude => {
                to_local_origin_scaled(lat, lon, self.lat0, self.lon0)
            }
        };
        Vec2::new(x, y)
    }

    fn to_latlon(&self, local: &Vec2) -> (f64, f64) {
        to_latlon(local.x, local.y, self.lat0, self.lon0)
    }
}

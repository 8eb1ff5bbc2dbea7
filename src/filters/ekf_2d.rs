//! 2-state position EKF driven by PDR displacement
//!
//! State: `(x, y)` in the local tangent plane. The PDR delta between
//! consecutive records is the control input, so the motion model is the
//! identity plus `u`. Absolute fixes (GNSS or WiFi) observe the state
//! directly (`H = I`).
//!
//! Fixes whose squared Mahalanobis distance exceeds `robust_threshold` are
//! not dropped. They still correct the state, but through a gain computed
//! with `R * inflation_factor`, and the record is flagged as not used.

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::geodesy::Projection;
use crate::types::{FixNoise, FixVec, KalmanGainFix, Mat2, Record, Vec2};

/// Initial position variance (m²); the first fix dominates immediately.
const INITIAL_VARIANCE: f64 = 1e-4;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ekf2dState {
    /// Local position (m)
    pub position: (f64, f64),
    pub covariance_trace: f64,
    /// 1-sigma radius from the covariance trace (m)
    pub uncertainty_m: f64,

    /// Update counters
    pub predictions: u64,
    pub fixes_accepted: u64,
    pub fixes_gated: u64,
    pub fixes_singular: u64,
}

/// Result of offering one absolute fix to the filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixOutcome {
    /// Innovation passed the gate, nominal R used
    Accepted { d2: f64 },
    /// Innovation failed the gate, inflated R used
    Gated { d2: f64 },
    /// Innovation covariance not invertible, state left at the prediction
    Singular,
}

impl FixOutcome {
    /// Whether the record's `*Used` flag should be set.
    pub fn used(&self) -> bool {
        matches!(self, FixOutcome::Accepted { .. })
    }
}

pub struct Ekf2d {
    state: Vec2,
    covariance: Mat2,
    process_noise: Mat2,
    r_fix: FixNoise,
    robust_threshold: f64,
    inflation_factor: f64,

    predictions: u64,
    fixes_accepted: u64,
    fixes_gated: u64,
    fixes_singular: u64,
}

impl Ekf2d {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            state: Vec2::zeros(),
            covariance: Mat2::identity() * INITIAL_VARIANCE,
            process_noise: config.process_noise_matrix(),
            r_fix: config.measurement_noise_matrix(),
            robust_threshold: config.robust_threshold,
            inflation_factor: config.inflation_factor,
            predictions: 0,
            fixes_accepted: 0,
            fixes_gated: 0,
            fixes_singular: 0,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.state
    }

    pub fn covariance(&self) -> &Mat2 {
        &self.covariance
    }

    pub fn get_state(&self) -> Ekf2dState {
        let trace = self.covariance.trace();
        Ekf2dState {
            position: (self.state.x, self.state.y),
            covariance_trace: trace,
            uncertainty_m: trace.max(0.0).sqrt(),
            predictions: self.predictions,
            fixes_accepted: self.fixes_accepted,
            fixes_gated: self.fixes_gated,
            fixes_singular: self.fixes_singular,
        }
    }

    /// Dead-reckon by the PDR displacement `u`.
    pub fn predict(&mut self, u: &Vec2) {
        self.state += u;
        self.covariance += self.process_noise;
        self.predictions += 1;
    }

    /// Correct with a fix already projected into the local frame.
    ///
    /// Must follow `predict`; the covariance used is the predicted one.
    pub fn update_fix(&mut self, z: &FixVec) -> FixOutcome {
        let innovation = z - self.state;
        let s = self.covariance + self.r_fix;

        let Some(s_inv) = s.try_inverse() else {
            self.fixes_singular += 1;
            log::warn!("Singular innovation covariance, fix ignored");
            return FixOutcome::Singular;
        };
        let d2 = (innovation.transpose() * s_inv * innovation)[(0, 0)];

        let (gain, outcome): (KalmanGainFix, FixOutcome) = if d2 > self.robust_threshold {
            let s_inflated = self.covariance + self.r_fix * self.inflation_factor;
            let Some(inv) = s_inflated.try_inverse() else {
                self.fixes_singular += 1;
                log::warn!("Singular inflated innovation covariance, fix ignored");
                return FixOutcome::Singular;
            };
            (self.covariance * inv, FixOutcome::Gated { d2 })
        } else {
            (self.covariance * s_inv, FixOutcome::Accepted { d2 })
        };

        self.state += gain * innovation;
        self.covariance = (Mat2::identity() - gain) * self.covariance;

        match outcome {
            FixOutcome::Accepted { .. } => self.fixes_accepted += 1,
            FixOutcome::Gated { d2 } => {
                self.fixes_gated += 1;
                log::debug!("Fix gated: d2={:.2} > {:.2}", d2, self.robust_threshold);
            }
            FixOutcome::Singular => {}
        }
        outcome
    }
}

/// Run the filter over `records` in order and annotate each one.
///
/// Writes `ekfLocalX/Y`, `ekfLat/Lng` and the `*Used` flag of the configured
/// fix source. The filter starts at the local origin with the first record's
/// PDR as the displacement reference, so the first step has `u = 0`.
pub fn fuse_records<P: Projection>(
    records: &mut [Record],
    projection: &P,
    config: &FusionConfig,
) -> Ekf2dState {
    let mut ekf = Ekf2d::new(config);
    let source = config.fix_source;

    let Some(first) = records.first() else {
        return ekf.get_state();
    };
    let mut prev_pdr = Vec2::new(first.pdr_x, first.pdr_y);

    for record in records.iter_mut() {
        let pdr = Vec2::new(record.pdr_x, record.pdr_y);
        ekf.predict(&(pdr - prev_pdr));

        let used = match record.fix(source) {
            Some((lat, lon)) => {
                let z = projection.to_local(lat, lon);
                ekf.update_fix(&z).used()
            }
            None => false,
        };

        let position = ekf.position();
        let (lat, lng) = projection.to_latlon(&position);
        record.ekf_local_x = Some(position.x);
        record.ekf_local_y = Some(position.y);
        record.ekf_lat = Some(lat);
        record.ekf_lng = Some(lng);
        record.set_fix_used(source, used);

        prev_pdr = pdr;
    }

    let state = ekf.get_state();
    log::info!(
        "EKF: {} steps, {} fixes accepted, {} gated, final σ={:.2} m",
        state.predictions,
        state.fixes_accepted,
        state.fixes_gated,
        state.uncertainty_m
    );
    state
}

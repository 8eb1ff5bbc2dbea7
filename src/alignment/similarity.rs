//! Closed-form 2D similarity transform (weighted Procrustes with scale)
//!
//! Finds `s`, `R`, `t` minimizing `Σ w_i ‖s·R·p_i + t − q_i‖²`.
//!
//! # Algorithm
//! 1. Weighted centroids `μP`, `μQ`
//! 2. Cross-covariance `A = Σ w_i (p_i − μP)(q_i − μQ)ᵀ`
//! 3. `A = U·Σ·Vᵀ`, `R = V·Uᵀ`; a reflection (`det R < 0`) is turned into a
//!    proper rotation by negating the weakest singular direction of `V`
//! 4. `s = ΣΣ / Σ w_i ‖p_i − μP‖²`, or `1.0` when the source has no spread
//! 5. `t = μQ − s·R·μP`

use serde::{Deserialize, Serialize};

use crate::types::{Mat2, Vec2};

/// Below this weighted source spread the scale is not observable.
const MIN_SPREAD: f64 = 1e-12;

/// `p' = s * R * p + t` (column vectors)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityTransform {
    pub scale: f64,
    pub rotation: Mat2,
    pub translation: Vec2,
}

/// Flat, human-readable form for logs and JSON reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub scale: f64,
    pub rotation_deg: f64,
    pub rotation: [[f64; 2]; 2],
    pub translation: [f64; 2],
}

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rotation: Mat2::identity(),
            translation: Vec2::zeros(),
        }
    }

    /// Fit the transform mapping `source` onto `target`.
    ///
    /// `weights` defaults to uniform. Returns `None` for fewer than two
    /// pairs, mismatched lengths, or a non-positive weight sum; callers treat
    /// that as "leave this scope unaligned".
    pub fn fit(source: &[Vec2], target: &[Vec2], weights: Option<&[f64]>) -> Option<Self> {
        let n = source.len();
        if n < 2 || target.len() != n {
            return None;
        }
        if weights.is_some_and(|w| w.len() != n) {
            return None;
        }
        let weight = |i: usize| weights.map_or(1.0, |w| w[i]);

        let weight_sum: f64 = (0..n).map(weight).sum();
        if !(weight_sum > 0.0) {
            return None;
        }

        let mu_p = (0..n).fold(Vec2::zeros(), |acc, i| acc + source[i] * weight(i)) / weight_sum;
        let mu_q = (0..n).fold(Vec2::zeros(), |acc, i| acc + target[i] * weight(i)) / weight_sum;

        let mut cross = Mat2::zeros();
        let mut spread = 0.0;
        for i in 0..n {
            let w = weight(i);
            let pc = source[i] - mu_p;
            let qc = target[i] - mu_q;
            cross += pc * qc.transpose() * w;
            spread += w * pc.norm_squared();
        }

        let svd = cross.svd(true, true);
        let u = svd.u?;
        let mut v_t = svd.v_t?;
        let mut rotation = v_t.transpose() * u.transpose();

        if rotation.determinant() < 0.0 {
            let weakest = svd.singular_values.imin();
            for col in 0..2 {
                v_t[(weakest, col)] = -v_t[(weakest, col)];
            }
            rotation = v_t.transpose() * u.transpose();
        }

        let scale = if spread > MIN_SPREAD {
            svd.singular_values.sum() / spread
        } else {
            1.0
        };
        let translation = mu_q - scale * (rotation * mu_p);

        Some(Self {
            scale,
            rotation,
            translation,
        })
    }

    pub fn apply(&self, point: &Vec2) -> Vec2 {
        self.scale * (self.rotation * point) + self.translation
    }

    /// Rotation angle in radians, counter-clockwise.
    pub fn rotation_angle(&self) -> f64 {
        self.rotation[(1, 0)].atan2(self.rotation[(0, 0)])
    }

    /// Root-mean-square distance between transformed `source` and `target`.
    pub fn rms_residual(&self, source: &[Vec2], target: &[Vec2]) -> f64 {
        if source.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = source
            .iter()
            .zip(target)
            .map(|(p, q)| (self.apply(p) - q).norm_squared())
            .sum();
        (sum_sq / source.len() as f64).sqrt()
    }

    pub fn summary(&self) -> TransformSummary {
        let r = &self.rotation;
        TransformSummary {
            scale: self.scale,
            rotation_deg: self.rotation_angle().to_degrees(),
            rotation: [[r[(0, 0)], r[(0, 1)]], [r[(1, 0)], r[(1, 1)]]],
            translation: [self.translation.x, self.translation.y],
        }
    }
}

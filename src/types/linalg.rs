//! Linear algebra type system for the fusion and alignment code
//!
//! Every point transform in this crate uses column vectors:
//! `p' = s * R * p + t`. The Procrustes solver fits in that convention and
//! `SimilarityTransform::apply` is the only place it gets applied.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 2; // (x, y) in the local tangent plane

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_FIX: usize = 2; // projected absolute fix (x, y)

// ===== Filter Types =====
pub type Vec2 = SVector<f64, STATE_DIM>;
pub type Mat2 = SMatrix<f64, STATE_DIM, STATE_DIM>;

// Measurement types
pub type FixVec = SVector<f64, MEASURE_DIM_FIX>;
pub type FixNoise = SMatrix<f64, MEASURE_DIM_FIX, MEASURE_DIM_FIX>;

// Kalman gain
pub type KalmanGainFix = SMatrix<f64, STATE_DIM, MEASURE_DIM_FIX>; // 2×2

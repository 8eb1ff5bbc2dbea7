//! Tunable parameters, passed explicitly to each stage
//!
//! Every struct deserializes with `#[serde(default)]`, so a JSON config file
//! only needs the keys it overrides.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};
use crate::geodesy::ScaleConvention;
use crate::types::{FixSource, Mat2, Vec2};

/// EKF noise model and outlier gate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Diagonal of the process-noise covariance Q (m² per step)
    pub process_noise: [f64; 2],
    /// Diagonal of the measurement-noise covariance R (m²)
    pub measurement_noise: [f64; 2],
    /// χ²(2) gate on the squared Mahalanobis distance of a fix
    pub robust_threshold: f64,
    /// Multiplier on R when a fix fails the gate
    pub inflation_factor: f64,
    pub fix_source: FixSource,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            process_noise: [0.2, 0.2],
            measurement_noise: [10.0, 10.0],
            robust_threshold: 9.21, // χ²(2) 99th percentile
            inflation_factor: 10.0,
            fix_source: FixSource::Gnss,
        }
    }
}

impl FusionConfig {
    pub fn isotropic(process_var: f64, measurement_var: f64) -> Self {
        Self {
            process_noise: [process_var; 2],
            measurement_noise: [measurement_var; 2],
            ..Self::default()
        }
    }

    pub fn process_noise_matrix(&self) -> Mat2 {
        Mat2::from_diagonal(&Vec2::from(self.process_noise))
    }

    pub fn measurement_noise_matrix(&self) -> Mat2 {
        Mat2::from_diagonal(&Vec2::from(self.measurement_noise))
    }

    /// R must be positive-definite so the innovation covariance is always
    /// invertible; Q may be zero (pure PDR trust) but not negative.
    pub fn validate(&self) -> Result<()> {
        if !self.measurement_noise.iter().all(|v| v.is_finite() && *v > 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "measurement_noise must be positive, got {:?}",
                self.measurement_noise
            )));
        }
        if !self.process_noise.iter().all(|v| v.is_finite() && *v >= 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "process_noise must be non-negative, got {:?}",
                self.process_noise
            )));
        }
        if self.robust_threshold.is_nan() || self.robust_threshold <= 0.0 {
            return Err(FusionError::InvalidConfig(format!(
                "robust_threshold must be positive, got {}",
                self.robust_threshold
            )));
        }
        if !(self.inflation_factor.is_finite() && self.inflation_factor >= 1.0) {
            return Err(FusionError::InvalidConfig(format!(
                "inflation_factor must be >= 1, got {}",
                self.inflation_factor
            )));
        }
        Ok(())
    }
}

/// Anchor weighting and clustering for one alignment pass
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Trust weight for anchors without `calibWeight`
    pub default_weight: f64,
    /// Clustering radius (m); <= 0 disables clustering
    pub dist_thresh: f64,
    /// Reserved, currently unused
    pub smoothing_count: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            default_weight: 1.0,
            dist_thresh: 1.0,
            smoothing_count: 0,
        }
    }
}

impl AlignmentConfig {
    pub fn with_weight(default_weight: f64) -> Self {
        Self {
            default_weight,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.default_weight.is_finite() && self.default_weight > 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "default_weight must be positive, got {}",
                self.default_weight
            )));
        }
        if !self.dist_thresh.is_finite() {
            return Err(FusionError::InvalidConfig(
                "dist_thresh must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snap near-anchor standstill samples onto the anchor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandstillConfig {
    pub enabled: bool,
    /// Records inspected on each side of an anchor
    pub window: usize,
    /// Max distance (m) from the anchor's predicted position
    pub dist_threshold: f64,
}

impl Default for StandstillConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 5,
            dist_threshold: 0.2,
        }
    }
}

/// Everything one session run needs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fusion: FusionConfig,
    /// Global pass on raw PDR before fusion
    pub pre_fusion_alignment: AlignmentConfig,
    /// Global pass on EKF output after fusion
    pub post_fusion_alignment: AlignmentConfig,
    /// Piecewise passes of the label pipeline
    pub label_alignment: AlignmentConfig,
    pub standstill: StandstillConfig,
    /// Drop repeated WiFi fixes within this many degrees; `None` keeps all
    pub wifi_dedup_tolerance: Option<f64>,
    /// Run the EKF plus a second piecewise pass when building labels
    pub refine_labels_with_ekf: bool,
    pub scale_convention: ScaleConvention,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            pre_fusion_alignment: AlignmentConfig::with_weight(50.0),
            post_fusion_alignment: AlignmentConfig::with_weight(10.0),
            label_alignment: AlignmentConfig::default(),
            standstill: StandstillConfig::default(),
            wifi_dedup_tolerance: None,
            refine_labels_with_ekf: false,
            scale_convention: ScaleConvention::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(FusionError::Config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.fusion.validate()?;
        self.pre_fusion_alignment.validate()?;
        self.post_fusion_alignment.validate()?;
        self.label_alignment.validate()?;
        if let Some(tol) = self.wifi_dedup_tolerance {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(FusionError::InvalidConfig(format!(
                    "wifi_dedup_tolerance must be non-negative, got {tol}"
                )));
            }
        }
        Ok(())
    }
}

//! Serde-loadable fit configuration
//!
//! Every field has a default, so partial JSON documents are accepted.

use crate::error::ConfigError;
use crate::filters::{Chi2OutlierFinder, MomentumReverseLogic};
use crate::propagator::{FreeToBoundCorrection, PropagatorPlainOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub propagator: PropagatorPlainOptions,
    pub multiple_scattering: bool,
    pub energy_loss: bool,
    pub reversed_filtering: bool,
    pub reversed_filtering_covariance_scaling: f64,
    pub free_to_bound_correction: FreeToBoundCorrection,
    /// Chi² above which a measurement is treated as an outlier
    pub outlier_chi2_cut: Option<f64>,
    /// Momentum below which the reversed filter replaces the smoother (GeV)
    pub reverse_momentum_threshold: Option<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            propagator: PropagatorPlainOptions::default(),
            multiple_scattering: true,
            energy_loss: true,
            reversed_filtering: false,
            reversed_filtering_covariance_scaling: 1.0,
            free_to_bound_correction: FreeToBoundCorrection::default(),
            outlier_chi2_cut: None,
            reverse_momentum_threshold: None,
        }
    }
}

impl FitConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: FitConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scaling = self.reversed_filtering_covariance_scaling;
        if !(scaling.is_finite() && scaling > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "reversed_filtering_covariance_scaling must be positive, got {}",
                scaling
            )));
        }
        if self.propagator.max_steps == 0 {
            return Err(ConfigError::Invalid("propagator.max_steps must be positive".into()));
        }
        let step = self.propagator.max_step_size;
        if !(step.is_finite() && step != 0.0) {
            return Err(ConfigError::Invalid(format!(
                "propagator.max_step_size must be finite and non-zero, got {}",
                step
            )));
        }
        if self.propagator.mass < 0.0 {
            return Err(ConfigError::Invalid("propagator.mass must not be negative".into()));
        }
        if let Some(cut) = self.outlier_chi2_cut {
            if !(cut > 0.0) {
                return Err(ConfigError::Invalid(format!("outlier_chi2_cut must be positive, got {}", cut)));
            }
        }
        Ok(())
    }

    pub fn outlier_finder(&self) -> Option<Chi2OutlierFinder> {
        self.outlier_chi2_cut.map(Chi2OutlierFinder::new)
    }

    pub fn reverse_logic(&self) -> Option<MomentumReverseLogic> {
        self.reverse_momentum_threshold.map(MomentumReverseLogic::new)
    }
}

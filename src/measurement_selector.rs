//! Chi² compatibility of measurements with a predicted state
//!
//! Measurements are stored zero-padded to the maximum size. The effective
//! size is dispatched at runtime and only the leading block takes part in the
//! computation.

use crate::error::{KalmanFitterError, Result};
use crate::event_data::{CalibratedMeasurement, ParameterEstimate};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Run `visit` with a measurement size validated against `[1, MEASUREMENT_SIZE_MAX]`.
pub fn visit_measurement<T, F>(size: usize, visit: F) -> Result<T>
where
    F: FnOnce(usize) -> Result<T>,
{
    match size {
        1..=MEASUREMENT_SIZE_MAX => visit(size),
        _ => Err(KalmanFitterError::InvalidMeasurementSize(size)),
    }
}

/// χ² = rᵀ S⁻¹ r with r = m − H x and S = V + H C Hᵀ.
///
/// # Arguments
/// * `calibrated` - Measurement, valid in its leading `size` entries
/// * `calibrated_cov` - Measurement covariance, valid in its leading block
/// * `projector` - Full projector, only the leading `size` rows are used
pub fn calculate_chi2(
    calibrated: &MeasurementVector,
    calibrated_cov: &MeasurementCovariance,
    predicted: &BoundVector,
    predicted_cov: &BoundMatrix,
    projector: &Projector,
    size: usize,
) -> Result<f64> {
    visit_measurement(size, |k| {
        let h = projector.rows(0, k).into_owned();
        let m = calibrated.rows(0, k).into_owned();
        let v = calibrated_cov.view((0, 0), (k, k)).into_owned();

        let residual = m - &h * predicted;
        let innovation = v + &h * predicted_cov * h.transpose();
        let innovation_inv = innovation
            .try_inverse()
            .ok_or(KalmanFitterError::SingularMatrix("innovation covariance"))?;
        Ok(residual.dot(&(innovation_inv * &residual)))
    })
}

/// Chi² of a calibrated measurement against a prediction.
pub fn measurement_chi2(measurement: &CalibratedMeasurement, predicted: &ParameterEstimate) -> Result<f64> {
    calculate_chi2(
        &measurement.parameters,
        &measurement.covariance,
        &predicted.parameters,
        &predicted.covariance,
        &measurement.projector,
        measurement.size,
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSelectorConfig {
    /// Largest accepted chi²
    pub chi2_cut_off: f64,
    /// Most measurements kept per surface
    pub num_measurements_cut_off: usize,
}

impl Default for MeasurementSelectorConfig {
    fn default() -> Self {
        Self {
            chi2_cut_off: 15.0,
            num_measurements_cut_off: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectedMeasurement {
    /// Position in the candidate slice
    pub index: usize,
    pub chi2: f64,
    pub is_outlier: bool,
}

/// Ranks candidate measurements on one surface by chi².
#[derive(Clone, Copy, Debug, Default)]
pub struct MeasurementSelector {
    pub config: MeasurementSelectorConfig,
}

impl MeasurementSelector {
    pub fn new(config: MeasurementSelectorConfig) -> Self {
        Self { config }
    }

    /// Candidates passing the cut, best first. When none pass, the best one is
    /// returned alone and flagged as outlier.
    pub fn select(
        &self,
        predicted: &ParameterEstimate,
        candidates: &[CalibratedMeasurement],
    ) -> Result<Vec<SelectedMeasurement>> {
        let mut ranked = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                measurement_chi2(candidate, predicted).map(|chi2| SelectedMeasurement {
                    index,
                    chi2,
                    is_outlier: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        ranked.sort_by(|a, b| a.chi2.total_cmp(&b.chi2));

        let Some(best) = ranked.first().copied() else {
            return Ok(ranked);
        };
        let accepted: Vec<_> = ranked
            .into_iter()
            .filter(|m| m.chi2 <= self.config.chi2_cut_off)
            .take(self.config.num_measurements_cut_off)
            .collect();
        if accepted.is_empty() {
            return Ok(vec![SelectedMeasurement {
                is_outlier: true,
                ..best
            }]);
        }
        Ok(accepted)
    }
}

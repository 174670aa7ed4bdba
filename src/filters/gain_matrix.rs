//! Gain-matrix Kalman update and Rauch–Tung–Striebel smoother

use super::extensions::{Smoother, Updater};
use crate::error::{KalmanFitterError, Result};
use crate::event_data::{wrap_phi, MultiTrajectory, ParameterEstimate, TrackState};
use crate::measurement_selector::visit_measurement;
use crate::types::*;
use log::{debug, trace};

#[derive(Clone, Copy, Debug, Default)]
pub struct GainMatrixUpdater;

impl Updater for GainMatrixUpdater {
    fn update(&self, _gctx: &GeometryContext, state: &mut TrackState, nav_dir: NavigationDirection) -> Result<()> {
        let predicted = state
            .predicted
            .as_ref()
            .ok_or_else(|| KalmanFitterError::UpdateFailed("state has no prediction".into()))?;
        let calibrated = state
            .calibrated
            .as_ref()
            .ok_or_else(|| KalmanFitterError::UpdateFailed("state has no calibrated measurement".into()))?;
        trace!("Gain matrix update on state {} ({})", state.index(), nav_dir);

        let (filtered, chi2) = visit_measurement(calibrated.size, |k| {
            let h = calibrated.effective_projector();
            let m = calibrated.effective_parameters();
            let v = calibrated.effective_covariance();
            let x = &predicted.parameters;
            let c = &predicted.covariance;

            let innovation = v + &h * c * h.transpose();
            let innovation_inv = innovation.try_inverse().ok_or_else(|| {
                KalmanFitterError::UpdateFailed(format!("singular innovation covariance ({}D)", k))
            })?;
            let gain = c * h.transpose() * &innovation_inv;

            let residual = m - &h * x;
            let mut parameters = x + &gain * &residual;
            parameters[BOUND_PHI] = wrap_phi(parameters[BOUND_PHI]);
            let covariance = (BoundMatrix::identity() - &gain * &h) * c;
            let chi2 = residual.dot(&(&innovation_inv * &residual));

            if parameters.iter().any(|v| !v.is_finite()) {
                return Err(KalmanFitterError::UpdateFailed("non-finite filtered parameters".into()));
            }
            Ok((ParameterEstimate::new(parameters, covariance), chi2))
        })?;

        state.filtered = Some(filtered);
        state.chi2 = chi2;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GainMatrixSmoother;

impl Smoother for GainMatrixSmoother {
    /// Backward recursion from `entry_index`, whose smoothed estimate is its
    /// filtered one, through every predecessor that has a filtered estimate.
    fn smooth(&self, _gctx: &GeometryContext, trajectory: &mut MultiTrajectory, entry_index: usize) -> Result<()> {
        let entry = trajectory
            .get_mut(entry_index)
            .ok_or(KalmanFitterError::SmoothFailed)?;
        let filtered = entry.filtered.clone().ok_or(KalmanFitterError::SmoothFailed)?;
        entry.smoothed = Some(filtered);

        let mut next = entry_index;
        let mut smoothed_count = 1;
        while let Some(previous) = trajectory[next].previous() {
            let next_state = &trajectory[next];
            let (Some(next_smoothed), Some(next_predicted), Some(jacobian)) = (
                next_state.smoothed.as_ref(),
                next_state.predicted.as_ref(),
                next_state.jacobian.as_ref(),
            ) else {
                return Err(KalmanFitterError::SmoothFailed);
            };
            let Some(prev_filtered) = trajectory[previous].filtered.as_ref() else {
                return Err(KalmanFitterError::SmoothFailed);
            };

            let predicted_inv = next_predicted
                .covariance
                .try_inverse()
                .ok_or(KalmanFitterError::SmoothFailed)?;
            let gain = prev_filtered.covariance * jacobian.transpose() * predicted_inv;

            let mut delta = next_smoothed.parameters - next_predicted.parameters;
            delta[BOUND_PHI] = wrap_phi(delta[BOUND_PHI]);
            let mut parameters = prev_filtered.parameters + gain * delta;
            parameters[BOUND_PHI] = wrap_phi(parameters[BOUND_PHI]);
            let covariance = prev_filtered.covariance
                + gain * (next_smoothed.covariance - next_predicted.covariance) * gain.transpose();

            trajectory[previous].smoothed = Some(ParameterEstimate::new(parameters, covariance));
            smoothed_count += 1;
            next = previous;
        }

        debug!("Smoothed {} states from state {}", smoothed_count, entry_index);
        Ok(())
    }
}

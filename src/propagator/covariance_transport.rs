//! Bound covariance transport between surfaces
//!
//! The stepper accumulates the free transport jacobian step by step. Binding
//! to a surface folds it together with the bound-to-free jacobian of the
//! previous surface, the path correction onto the new surface and the
//! free-to-bound jacobian of the new surface.

use super::stepper::StepperState;
use crate::event_data::{free_direction, free_position, transform_free_to_bound, wrap_phi};
use crate::geometry::Surface;
use crate::types::*;
use log::trace;
use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

/// Sigma-point correction for the non-linear free-to-bound step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeToBoundCorrection {
    pub apply: bool,
    /// Spread of the sigma points
    pub alpha: f64,
    /// Prior knowledge of the distribution, 2 for Gaussians
    pub beta: f64,
}

impl Default for FreeToBoundCorrection {
    fn default() -> Self {
        Self {
            apply: false,
            alpha: 0.1,
            beta: 2.0,
        }
    }
}

impl FreeToBoundCorrection {
    pub fn enabled() -> Self {
        Self {
            apply: true,
            ..Self::default()
        }
    }
}

/// Transport the covariance onto `surface` and restart the jacobians there.
pub fn transport_covariance_to_bound(
    gctx: &GeometryContext,
    state: &mut StepperState,
    surface: &dyn Surface,
    correction: &FreeToBoundCorrection,
) {
    let free_to_path = surface.free_to_path_derivative(gctx, &state.pars);
    let free_to_bound = surface.free_to_bound_jacobian(gctx, &state.pars);
    let path_correction = FreeMatrix::identity() + state.derivative * free_to_path;
    let full_jacobian =
        free_to_bound * path_correction * state.jac_transport * state.jac_to_global;

    let linear = full_jacobian * state.cov * full_jacobian.transpose();
    state.cov = if correction.apply {
        corrected_covariance(gctx, state, surface, correction, &linear).unwrap_or(linear)
    } else {
        linear
    };
    state.jacobian = full_jacobian;

    let bound = transform_free_to_bound(gctx, surface, &state.pars);
    state.jac_transport = FreeMatrix::identity();
    state.derivative = FreeVector::zeros();
    state.jac_to_global = surface.bound_to_free_jacobian(gctx, &bound);
}

const SIGMA_DIM: usize = 6;
const SIGMA_INDICES: [usize; SIGMA_DIM] =
    [FREE_POS0, FREE_POS1, FREE_POS2, FREE_DIR0, FREE_DIR1, FREE_DIR2];

/// Scaled unscented transform of the position/direction covariance through the
/// straight-line intersection with `surface`.
///
/// Only the (loc0, loc1, phi, theta) block is replaced; q/p and time keep their
/// linear terms. Returns `None` when a sigma point misses the surface or the
/// free covariance is not positive semi-definite.
fn corrected_covariance(
    gctx: &GeometryContext,
    state: &StepperState,
    surface: &dyn Surface,
    correction: &FreeToBoundCorrection,
    linear: &BoundMatrix,
) -> Option<BoundMatrix> {
    let free_jacobian = state.jac_transport * state.jac_to_global;
    let free_cov = free_jacobian * state.cov * free_jacobian.transpose();

    let mut sub_cov = SMatrix::<f64, SIGMA_DIM, SIGMA_DIM>::zeros();
    for (row, &i) in SIGMA_INDICES.iter().enumerate() {
        for (col, &j) in SIGMA_INDICES.iter().enumerate() {
            sub_cov[(row, col)] = free_cov[(i, j)];
        }
    }

    let n = SIGMA_DIM as f64;
    let lambda = correction.alpha * correction.alpha * n - n;
    let scale = n + lambda;
    if scale <= 0.0 {
        return None;
    }

    let eigen = sub_cov.symmetric_eigen();
    let tolerance = 1e-12 * eigen.eigenvalues.amax().max(f64::MIN_POSITIVE);
    if eigen.eigenvalues.iter().any(|&v| v < -tolerance) {
        trace!("Skipping free-to-bound correction: covariance not positive semi-definite");
        return None;
    }

    let mean = state.pars;
    let mut sigma_bound = Vec::with_capacity(2 * SIGMA_DIM + 1);
    sigma_bound.push(project_to_surface(gctx, surface, &mean)?);
    for k in 0..SIGMA_DIM {
        let spread = (scale * eigen.eigenvalues[k].max(0.0)).sqrt();
        let offset: SVector<f64, SIGMA_DIM> = eigen.eigenvectors.column(k) * spread;
        for sign in [1.0, -1.0] {
            let mut point = mean;
            for (row, &i) in SIGMA_INDICES.iter().enumerate() {
                point[i] += sign * offset[row];
            }
            sigma_bound.push(project_to_surface(gctx, surface, &point)?);
        }
    }

    let w0_mean = lambda / scale;
    let w0_cov = w0_mean + 1.0 - correction.alpha * correction.alpha + correction.beta;
    let wi = 1.0 / (2.0 * scale);
    let weight = |i: usize, w0: f64| if i == 0 { w0 } else { wi };

    // Differences to the central point keep phi continuous
    let central = sigma_bound[0];
    let deltas: Vec<SVector<f64, 4>> = sigma_bound
        .iter()
        .map(|b| {
            let mut d = SVector::<f64, 4>::new(
                b[BOUND_LOC0] - central[BOUND_LOC0],
                b[BOUND_LOC1] - central[BOUND_LOC1],
                b[BOUND_PHI] - central[BOUND_PHI],
                b[BOUND_THETA] - central[BOUND_THETA],
            );
            d[2] = wrap_phi(d[2]);
            d
        })
        .collect();

    let mean_delta = deltas
        .iter()
        .enumerate()
        .fold(SVector::<f64, 4>::zeros(), |acc, (i, d)| acc + d * weight(i, w0_mean));
    let block = deltas
        .iter()
        .enumerate()
        .fold(SMatrix::<f64, 4, 4>::zeros(), |acc, (i, d)| {
            let centered = d - mean_delta;
            acc + centered * centered.transpose() * weight(i, w0_cov)
        });

    let mut corrected = *linear;
    corrected.fixed_view_mut::<4, 4>(BOUND_LOC0, BOUND_LOC0).copy_from(&block);
    Some(corrected)
}

fn project_to_surface(gctx: &GeometryContext, surface: &dyn Surface, free: &FreeVector) -> Option<BoundVector> {
    let position = free_position(free);
    let direction = free_direction(free);
    let intersection = surface.intersect(gctx, &position, &direction, false);
    if !intersection.is_valid() || !intersection.path_length.is_finite() {
        return None;
    }
    let mut on_surface = *free;
    on_surface
        .fixed_rows_mut::<3>(FREE_POS0)
        .copy_from(&intersection.position);
    on_surface
        .fixed_rows_mut::<3>(FREE_DIR0)
        .copy_from(&direction);
    Some(transform_free_to_bound(gctx, surface, &on_surface))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_data::BoundTrackParameters;
    use crate::geometry::PlaneSurface;
    use crate::propagator::{StraightLineStepper, Stepper};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f64::consts::FRAC_PI_2;

    fn start_state(cov: BoundMatrix) -> StepperState {
        let gctx = GeometryContext;
        let start = PlaneSurface::new(Vector3::zeros(), Vector3::x()).into_shared();
        let mut bound = BoundVector::zeros();
        bound[BOUND_THETA] = FRAC_PI_2;
        bound[BOUND_QOP] = 1.0;
        let params = BoundTrackParameters::new(start, bound, Some(cov));
        StepperState::new(&gctx, &params, NavigationDirection::Forward, 100.0, 0.0)
    }

    #[test]
    fn test_straight_line_transport_of_angles() {
        let gctx = GeometryContext;
        let mut cov = BoundMatrix::zeros();
        cov[(BOUND_PHI, BOUND_PHI)] = 1e-4;
        let mut state = start_state(cov);

        StraightLineStepper::new().step(&mut state).unwrap();
        let target = PlaneSurface::new(Vector3::new(100.0, 0.0, 0.0), Vector3::x());
        transport_covariance_to_bound(&gctx, &mut state, &target, &FreeToBoundCorrection::default());

        // loc0 on the target plane is global y, so σ(loc0)² = L² σ(phi)²
        assert!((state.cov[(BOUND_LOC0, BOUND_LOC0)] - 1.0).abs() < 1e-9);
        assert!((state.cov[(BOUND_LOC0, BOUND_PHI)] - 1e-2).abs() < 1e-9);
        assert!((state.cov[(BOUND_PHI, BOUND_PHI)] - 1e-4).abs() < 1e-12);
        assert_relative_eq!(state.jac_transport, FreeMatrix::identity());
        assert_relative_eq!(state.derivative, FreeVector::zeros());
    }

    #[test]
    fn test_correction_matches_linear_for_small_errors() {
        let gctx = GeometryContext;
        let mut cov = BoundMatrix::identity() * 1e-6;
        cov[(BOUND_QOP, BOUND_QOP)] = 1e-8;

        let target = PlaneSurface::new(Vector3::new(100.0, 0.0, 0.0), Vector3::x());

        let mut linear = start_state(cov);
        StraightLineStepper::new().step(&mut linear).unwrap();
        transport_covariance_to_bound(&gctx, &mut linear, &target, &FreeToBoundCorrection::default());

        let mut corrected = start_state(cov);
        StraightLineStepper::new().step(&mut corrected).unwrap();
        transport_covariance_to_bound(&gctx, &mut corrected, &target, &FreeToBoundCorrection::enabled());

        assert_relative_eq!(corrected.cov, linear.cov, epsilon = 1e-8);
    }
}

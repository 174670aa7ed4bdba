//! Stepper contract and the state it advances
//!
//! A stepper owns no state itself. Everything it needs lives in
//! [`StepperState`] so one stepper can serve any number of fits.

use super::constrained_step::ConstrainedStep;
use super::covariance_transport::{self, FreeToBoundCorrection};
use crate::error::PropagatorError;
use crate::event_data::{
    free_direction, free_position, transform_bound_to_free, transform_free_to_bound,
    BoundTrackParameters,
};
use crate::geometry::{PlaneSurface, Surface, SurfaceRef};
use crate::types::*;
use nalgebra::Vector3;

/// Free parameters, bound covariance and the jacobians accumulated since the
/// last surface.
#[derive(Clone, Debug)]
pub struct StepperState {
    pub pars: FreeVector,
    pub cov: BoundMatrix,
    /// Whether the covariance is propagated at all
    pub cov_transport: bool,
    /// Full bound-to-bound jacobian of the last transport
    pub jacobian: BoundMatrix,
    pub jac_to_global: BoundToFreeMatrix,
    pub jac_transport: FreeMatrix,
    /// d(free)/d(path) at the current position
    pub derivative: FreeVector,
    pub nav_dir: NavigationDirection,
    pub step_size: ConstrainedStep,
    pub previous_step_size: f64,
    pub path_accumulated: f64,
    pub mass: f64,
}

impl StepperState {
    pub fn new(
        gctx: &GeometryContext,
        start: &BoundTrackParameters,
        nav_dir: NavigationDirection,
        max_step_size: f64,
        mass: f64,
    ) -> Self {
        let surface = start.reference_surface();
        Self {
            pars: start.free_parameters(gctx),
            cov: start.covariance().copied().unwrap_or_else(BoundMatrix::zeros),
            cov_transport: start.covariance().is_some(),
            jacobian: BoundMatrix::identity(),
            jac_to_global: surface.bound_to_free_jacobian(gctx, start.parameters()),
            jac_transport: FreeMatrix::identity(),
            derivative: FreeVector::zeros(),
            nav_dir,
            step_size: ConstrainedStep::new(max_step_size),
            previous_step_size: 0.0,
            path_accumulated: 0.0,
            mass,
        }
    }
}

/// Snapshot of the stepper bound to a surface.
#[derive(Clone, Debug)]
pub struct BoundState {
    pub parameters: BoundTrackParameters,
    pub jacobian: BoundMatrix,
    pub path_length: f64,
}

/// Bound state on the curvilinear plane at the current position.
pub type CurvilinearState = BoundState;

pub trait Stepper: Send + Sync {
    /// Advance by the current constrained step, returning the signed step taken.
    fn step(&self, state: &mut StepperState) -> Result<f64, PropagatorError>;

    fn position(&self, state: &StepperState) -> Vector3<f64> {
        free_position(&state.pars)
    }

    fn direction(&self, state: &StepperState) -> Vector3<f64> {
        free_direction(&state.pars)
    }

    fn qop(&self, state: &StepperState) -> f64 {
        state.pars[FREE_QOP]
    }

    fn charge(&self, state: &StepperState) -> f64 {
        if self.qop(state) < 0.0 {
            -1.0
        } else {
            1.0
        }
    }

    fn momentum(&self, state: &StepperState) -> f64 {
        self.charge(state) / self.qop(state)
    }

    fn time(&self, state: &StepperState) -> f64 {
        state.pars[FREE_TIME]
    }

    /// Bind the state to `surface`. The position must already lie on it.
    fn bound_state(
        &self,
        gctx: &GeometryContext,
        state: &mut StepperState,
        surface: &SurfaceRef,
        transport_cov: bool,
        correction: &FreeToBoundCorrection,
    ) -> Result<BoundState, PropagatorError> {
        if state.cov_transport && transport_cov {
            self.transport_covariance_to_bound(gctx, state, surface.as_ref(), correction);
        }
        let parameters = transform_free_to_bound(gctx, surface.as_ref(), &state.pars);
        if parameters.iter().any(|v| !v.is_finite()) {
            return Err(PropagatorError::InvalidStep(format!(
                "non-finite parameters on surface {}",
                surface.geometry_id()
            )));
        }
        let covariance = state.cov_transport.then_some(state.cov);
        Ok(BoundState {
            parameters: BoundTrackParameters::new(surface.clone(), parameters, covariance),
            jacobian: state.jacobian,
            path_length: state.path_accumulated,
        })
    }

    fn curvilinear_state(
        &self,
        gctx: &GeometryContext,
        state: &mut StepperState,
        transport_cov: bool,
    ) -> Result<CurvilinearState, PropagatorError> {
        let surface =
            PlaneSurface::curvilinear(self.position(state), self.direction(state)).into_shared();
        self.bound_state(
            gctx,
            state,
            &surface,
            transport_cov,
            &FreeToBoundCorrection::default(),
        )
    }

    /// Overwrite parameters and covariance after a measurement update.
    fn update(
        &self,
        gctx: &GeometryContext,
        state: &mut StepperState,
        free: &FreeVector,
        bound: &BoundVector,
        covariance: &BoundMatrix,
        surface: &dyn Surface,
    ) {
        state.pars = *free;
        state.cov = *covariance;
        state.jac_to_global = surface.bound_to_free_jacobian(gctx, bound);
    }

    fn update_momentum(&self, state: &mut StepperState, momentum: f64) {
        state.pars[FREE_QOP] = self.charge(state) / momentum;
    }

    /// Restart from bound parameters on `surface`, clearing the path and the
    /// transport jacobians.
    #[allow(clippy::too_many_arguments)]
    fn reset_state(
        &self,
        gctx: &GeometryContext,
        state: &mut StepperState,
        bound: &BoundVector,
        covariance: &BoundMatrix,
        surface: &dyn Surface,
        nav_dir: NavigationDirection,
        step_size: f64,
    ) {
        state.pars = transform_bound_to_free(gctx, surface, bound);
        state.cov = *covariance;
        state.nav_dir = nav_dir;
        state.step_size = ConstrainedStep::new(step_size);
        state.previous_step_size = 0.0;
        state.path_accumulated = 0.0;
        state.jacobian = BoundMatrix::identity();
        state.jac_to_global = surface.bound_to_free_jacobian(gctx, bound);
        state.jac_transport = FreeMatrix::identity();
        state.derivative = FreeVector::zeros();
    }

    fn transport_covariance_to_bound(
        &self,
        gctx: &GeometryContext,
        state: &mut StepperState,
        surface: &dyn Surface,
        correction: &FreeToBoundCorrection,
    ) {
        covariance_transport::transport_covariance_to_bound(gctx, state, surface, correction);
    }

    fn transport_covariance_to_curvilinear(&self, gctx: &GeometryContext, state: &mut StepperState) {
        let surface = PlaneSurface::curvilinear(self.position(state), self.direction(state));
        covariance_transport::transport_covariance_to_bound(
            gctx,
            state,
            &surface,
            &FreeToBoundCorrection::default(),
        );
    }

    fn set_identity_jacobian(&self, state: &mut StepperState) {
        state.jacobian = BoundMatrix::identity();
    }
}

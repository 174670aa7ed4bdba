use super::stepper::Stepper;
use super::{ConstraintType, PropagatorState};
use crate::geometry::{same_surface, SurfaceRef};
use log::debug;

/// Detects arrival on a target surface and steers the step size toward it.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceReached;

impl SurfaceReached {
    pub fn check<S: Stepper>(
        &self,
        state: &mut PropagatorState<'_>,
        stepper: &S,
        target: &SurfaceRef,
    ) -> bool {
        if state.navigation.target_reached {
            return true;
        }

        let on_current = state
            .navigation
            .current_surface
            .as_ref()
            .map_or(false, |current| same_surface(current, target));
        let position = stepper.position(&state.stepping);
        let direction = stepper.direction(&state.stepping) * state.stepping.nav_dir.sign();
        let intersection = target.intersect(state.geo_context, &position, &direction, false);

        if on_current || intersection.path_length.abs() <= state.options.target_tolerance {
            debug!("Target surface {} reached", target.geometry_id());
            state.navigation.target_reached = true;
            state.stepping.step_size.release(ConstraintType::Aborter);
            return true;
        }

        if intersection.is_valid() && intersection.path_length.is_finite() && intersection.path_length > 0.0 {
            state
                .stepping
                .step_size
                .update(intersection.path_length, ConstraintType::Aborter, true);
        }
        false
    }
}

/// Whether the accumulated path exhausted the path limit. Otherwise the
/// remaining distance constrains the next step.
pub fn path_limit_reached(state: &mut PropagatorState<'_>) -> bool {
    let limit = state.options.path_limit.abs();
    let travelled = state.stepping.path_accumulated.abs();
    let remaining = limit - travelled;
    if remaining <= state.options.target_tolerance {
        debug!("Path limit of {:.3} mm reached", limit);
        return true;
    }
    state
        .stepping
        .step_size
        .update(remaining, ConstraintType::Aborter, false);
    false
}

//! Surface discovery along the trajectory
//!
//! Both navigator kinds pick the nearest surface ahead of the track among
//! their candidates. The default navigator searches the whole tracking
//! geometry and boundary-checks its candidates, except for surfaces registered
//! as external. The direct navigator follows an explicit surface sequence and
//! never boundary-checks.

use super::stepper::Stepper;
use super::{ConstraintType, PropagatorState};
use crate::geometry::{same_surface, SurfaceRef, TrackingGeometry, ON_SURFACE_TOLERANCE};
use crate::types::GeometryId;
use log::trace;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum Navigator {
    Default(Arc<TrackingGeometry>),
    Direct,
}

/// Per-propagation navigation bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct NavigationState {
    candidates: Vec<SurfaceRef>,
    /// Surfaces exempt from boundary checks, keyed by layer
    external_surfaces: BTreeMap<u64, BTreeSet<GeometryId>>,
    pub start_surface: Option<SurfaceRef>,
    pub current_surface: Option<SurfaceRef>,
    pub next_surface: Option<SurfaceRef>,
    pub target_surface: Option<SurfaceRef>,
    pub navigation_break: bool,
    pub target_reached: bool,
}

impl NavigationState {
    pub fn insert_external_surface(&mut self, geometry_id: GeometryId) {
        self.external_surfaces
            .entry(geometry_id.layer())
            .or_default()
            .insert(geometry_id);
    }

    pub fn is_external(&self, geometry_id: GeometryId) -> bool {
        self.external_surfaces
            .get(&geometry_id.layer())
            .map_or(false, |ids| ids.contains(&geometry_id))
    }

    pub fn candidates(&self) -> &[SurfaceRef] {
        &self.candidates
    }

    /// Restart navigation on `start` heading for `target`.
    pub fn reset(&mut self, start: SurfaceRef, target: Option<SurfaceRef>) {
        self.start_surface = Some(start.clone());
        self.current_surface = Some(start);
        self.next_surface = None;
        self.target_surface = target;
        self.navigation_break = false;
        self.target_reached = false;
    }
}

impl Navigator {
    pub fn is_direct(&self) -> bool {
        matches!(self, Navigator::Direct)
    }

    /// Navigation state for a propagation starting on `start`.
    ///
    /// `sequence` is only read by the direct navigator.
    pub fn initialize(&self, start: &SurfaceRef, sequence: &[SurfaceRef]) -> NavigationState {
        let candidates = match self {
            Navigator::Default(geometry) => geometry.surfaces().to_vec(),
            Navigator::Direct => sequence.to_vec(),
        };
        let mut state = NavigationState {
            candidates,
            ..NavigationState::default()
        };
        state.reset(start.clone(), None);
        state
    }

    /// Update the current surface after a step.
    pub fn status<S: Stepper>(&self, state: &mut PropagatorState<'_>, stepper: &S) {
        state.navigation.current_surface = None;
        if state.navigation.navigation_break {
            return;
        }
        let Some(next) = state.navigation.next_surface.clone() else {
            return;
        };

        let position = stepper.position(&state.stepping);
        let direction = stepper.direction(&state.stepping) * state.stepping.nav_dir.sign();
        let intersection = next.intersect(state.geo_context, &position, &direction, false);
        if intersection.path_length.abs() <= ON_SURFACE_TOLERANCE {
            trace!("On surface {}", next.geometry_id());
            state.navigation.current_surface = Some(next);
            state.navigation.next_surface = None;
        }
    }

    /// Find the next surface and constrain the step size to reach it.
    pub fn target<S: Stepper>(&self, state: &mut PropagatorState<'_>, stepper: &S) {
        if state.navigation.navigation_break {
            return;
        }

        let position = stepper.position(&state.stepping);
        let direction = stepper.direction(&state.stepping) * state.stepping.nav_dir.sign();
        let navigation = &state.navigation;

        let mut best: Option<(f64, SurfaceRef)> = None;
        for candidate in &navigation.candidates {
            if navigation
                .current_surface
                .as_ref()
                .map_or(false, |current| same_surface(current, candidate))
            {
                continue;
            }
            let bound_check = !self.is_direct() && !navigation.is_external(candidate.geometry_id());
            let intersection =
                candidate.intersect(state.geo_context, &position, &direction, bound_check);
            if !intersection.is_valid() || intersection.path_length <= ON_SURFACE_TOLERANCE {
                continue;
            }
            if best
                .as_ref()
                .map_or(true, |(path, _)| intersection.path_length < *path)
            {
                best = Some((intersection.path_length, candidate.clone()));
            }
        }

        match best {
            Some((path, surface)) => {
                trace!("Next surface {} at {:.3} mm", surface.geometry_id(), path);
                state.navigation.next_surface = Some(surface);
                state
                    .stepping
                    .step_size
                    .update(path, ConstraintType::Navigator, true);
            }
            None => {
                trace!("No surface ahead, navigation break");
                state.navigation.next_surface = None;
                state.navigation.navigation_break = true;
                state.stepping.step_size.release(ConstraintType::Navigator);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_data::BoundTrackParameters;
    use crate::geometry::{PlaneSurface, TelescopeConfig};
    use crate::propagator::{PropagatorPlainOptions, StepperState, StraightLineStepper};
    use crate::types::*;
    use nalgebra::Vector3;

    fn geometry() -> Arc<TrackingGeometry> {
        Arc::new(TrackingGeometry::telescope(&TelescopeConfig::default()))
    }

    fn propagator_state<'a>(gctx: &'a GeometryContext, mctx: &'a MagneticFieldContext, navigator: &Navigator, y: f64) -> PropagatorState<'a> {
        let start = BoundTrackParameters::curvilinear(
            gctx,
            Vector3::new(0.0, y, 0.0),
            Vector3::x(),
            1.0,
            0.0,
            None,
        );
        let options = PropagatorPlainOptions::default();
        PropagatorState {
            geo_context: gctx,
            mag_field_context: mctx,
            stepping: StepperState::new(gctx, &start, options.direction, options.max_step_size, options.mass),
            navigation: navigator.initialize(start.reference_surface(), &[]),
            options,
            steps: 0,
        }
    }

    #[test]
    fn test_targets_nearest_surface_ahead() {
        let (gctx, mctx) = (GeometryContext, MagneticFieldContext);
        let navigator = Navigator::Default(geometry());
        let mut state = propagator_state(&gctx, &mctx, &navigator, 0.0);

        navigator.target(&mut state, &StraightLineStepper);
        let next = state.navigation.next_surface.clone().unwrap();
        assert_eq!(next.center(&gctx).x, 100.0);
        assert_eq!(state.stepping.step_size.value(), 100.0);
    }

    #[test]
    fn test_external_surfaces_skip_bound_check() {
        let (gctx, mctx) = (GeometryContext, MagneticFieldContext);
        let geometry = geometry();
        let navigator = Navigator::Default(geometry.clone());
        // Outside the 100 mm half size of every plane
        let mut state = propagator_state(&gctx, &mctx, &navigator, 150.0);

        navigator.target(&mut state, &StraightLineStepper);
        assert!(state.navigation.navigation_break);

        let mut state = propagator_state(&gctx, &mctx, &navigator, 150.0);
        let third = geometry.surfaces()[2].geometry_id();
        state.navigation.insert_external_surface(third);
        assert!(state.navigation.is_external(third));
        navigator.target(&mut state, &StraightLineStepper);
        let next = state.navigation.next_surface.clone().unwrap();
        assert_eq!(next.geometry_id(), third);
    }

    #[test]
    fn test_status_sets_current_surface() {
        let (gctx, mctx) = (GeometryContext, MagneticFieldContext);
        let navigator = Navigator::Default(geometry());
        let mut state = propagator_state(&gctx, &mctx, &navigator, 0.0);
        assert!(state.navigation.current_surface.is_some());

        navigator.target(&mut state, &StraightLineStepper);
        crate::propagator::Stepper::step(&StraightLineStepper, &mut state.stepping).unwrap();
        navigator.status(&mut state, &StraightLineStepper);
        let current = state.navigation.current_surface.clone().unwrap();
        assert_eq!(current.center(&gctx).x, 100.0);
    }

    #[test]
    fn test_direct_navigator_uses_sequence() {
        let (gctx, mctx) = (GeometryContext, MagneticFieldContext);
        let only = PlaneSurface::new(Vector3::new(42.0, 0.0, 0.0), Vector3::x()).into_shared();
        let navigator = Navigator::Direct;
        let mut state = propagator_state(&gctx, &mctx, &navigator, 0.0);
        state.navigation = navigator.initialize(&state.navigation.start_surface.clone().unwrap(), &[only.clone()]);

        navigator.target(&mut state, &StraightLineStepper);
        assert!(same_surface(state.navigation.next_surface.as_ref().unwrap(), &only));
    }
}

//! Propagation of track parameters through the tracking geometry
//!
//! The propagator owns the stepping loop. After every step it hands the
//! mutable [`PropagatorState`] to an [`Actor`] and asks an [`Aborter`] whether
//! to stop.

pub mod aborters;
pub mod constrained_step;
pub mod covariance_transport;
pub mod navigator;
pub mod stepper;
pub mod straight_line;

pub use aborters::*;
pub use constrained_step::*;
pub use covariance_transport::*;
pub use navigator::*;
pub use stepper::*;
pub use straight_line::*;

use crate::error::PropagatorError;
use crate::event_data::BoundTrackParameters;
use crate::geometry::SurfaceRef;
use crate::types::*;
use crate::units::{M, PION_MASS};
use log::debug;
use serde::{Deserialize, Serialize};

/// Options forwarded untouched from the fit configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagatorPlainOptions {
    pub direction: NavigationDirection,
    /// Signed along `direction` (mm)
    pub max_step_size: f64,
    /// Signed along `direction` (mm)
    pub path_limit: f64,
    pub max_steps: usize,
    /// Particle mass hypothesis (GeV)
    pub mass: f64,
    /// Distance at which a target surface counts as reached (mm)
    pub target_tolerance: f64,
}

impl Default for PropagatorPlainOptions {
    fn default() -> Self {
        Self {
            direction: NavigationDirection::Forward,
            max_step_size: 10.0 * M,
            path_limit: f64::MAX,
            max_steps: 1000,
            mass: PION_MASS,
            target_tolerance: 1e-4,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PropagatorOptions<'a> {
    pub geo_context: &'a GeometryContext,
    pub mag_field_context: &'a MagneticFieldContext,
    pub plain: PropagatorPlainOptions,
}

/// Everything an actor may inspect or change between two steps.
#[derive(Debug)]
pub struct PropagatorState<'a> {
    /// Working copy, actors may flip signs on reversal
    pub options: PropagatorPlainOptions,
    pub geo_context: &'a GeometryContext,
    pub mag_field_context: &'a MagneticFieldContext,
    pub stepping: StepperState,
    pub navigation: NavigationState,
    pub steps: usize,
}

/// Callback run after every step.
pub trait Actor<S: Stepper> {
    type Result;

    fn act(&self, state: &mut PropagatorState<'_>, stepper: &S, result: &mut Self::Result);
}

/// Termination predicate checked after every actor call.
pub trait Aborter<R> {
    fn should_abort(&self, state: &PropagatorState<'_>, result: &R) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PropagatorSummary {
    pub steps: usize,
    pub path_length: f64,
}

pub struct Propagator<S: Stepper> {
    stepper: S,
    navigator: Navigator,
}

impl<S: Stepper> Propagator<S> {
    pub fn new(stepper: S, navigator: Navigator) -> Self {
        Self { stepper, navigator }
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Step from `start` until the aborter fires, the path limit is used up or
    /// navigation runs out of surfaces with no target left.
    ///
    /// # Arguments
    /// * `sequence` - Surfaces for the direct navigator, ignored otherwise
    /// * `result` - Actor result slot, left in place for inspection on error
    pub fn propagate<A, B>(
        &self,
        start: &BoundTrackParameters,
        options: &PropagatorOptions<'_>,
        sequence: &[SurfaceRef],
        actor: &A,
        aborter: &B,
        result: &mut A::Result,
    ) -> Result<PropagatorSummary, PropagatorError>
    where
        A: Actor<S>,
        B: Aborter<A::Result>,
    {
        let plain = options.plain;
        let mut state = PropagatorState {
            options: plain,
            geo_context: options.geo_context,
            mag_field_context: options.mag_field_context,
            stepping: StepperState::new(
                options.geo_context,
                start,
                plain.direction,
                plain.max_step_size,
                plain.mass,
            ),
            navigation: self.navigator.initialize(start.reference_surface(), sequence),
            steps: 0,
        };

        actor.act(&mut state, &self.stepper, result);
        let mut terminated = Self::should_stop(&mut state, aborter, result);

        while !terminated && state.steps < plain.max_steps {
            self.navigator.target(&mut state, &self.stepper);
            self.stepper.step(&mut state.stepping)?;
            state.steps += 1;
            self.navigator.status(&mut state, &self.stepper);
            actor.act(&mut state, &self.stepper, result);
            terminated = Self::should_stop(&mut state, aborter, result);
        }

        if !terminated {
            return Err(PropagatorError::StepCountLimitReached(state.steps));
        }
        debug!(
            "Propagation finished after {} steps and {:.3} mm",
            state.steps, state.stepping.path_accumulated
        );
        Ok(PropagatorSummary {
            steps: state.steps,
            path_length: state.stepping.path_accumulated,
        })
    }

    fn should_stop<R, B: Aborter<R>>(state: &mut PropagatorState<'_>, aborter: &B, result: &R) -> bool {
        if aborter.should_abort(state, result) {
            return true;
        }
        // End of world: nothing ahead and nowhere to go
        if state.navigation.navigation_break && state.navigation.target_surface.is_none() {
            return true;
        }
        path_limit_reached(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{TelescopeConfig, TrackingGeometry};
    use nalgebra::Vector3;
    use std::sync::Arc;

    /// Records the x position of every surface the propagator lands on.
    struct SurfaceRecorder;

    impl<S: Stepper> Actor<S> for SurfaceRecorder {
        type Result = Vec<f64>;

        fn act(&self, state: &mut PropagatorState<'_>, _stepper: &S, result: &mut Vec<f64>) {
            if let Some(surface) = &state.navigation.current_surface {
                result.push(surface.center(state.geo_context).x);
            }
        }
    }

    struct Never;

    impl<R> Aborter<R> for Never {
        fn should_abort(&self, _state: &PropagatorState<'_>, _result: &R) -> bool {
            false
        }
    }

    fn start() -> BoundTrackParameters {
        BoundTrackParameters::curvilinear(&GeometryContext, Vector3::zeros(), Vector3::x(), 1.0, 0.0, None)
    }

    #[test]
    fn test_visits_telescope_in_order() {
        let geometry = Arc::new(TrackingGeometry::telescope(&TelescopeConfig::default()));
        let propagator = Propagator::new(StraightLineStepper, Navigator::Default(geometry));
        let (gctx, mctx) = (GeometryContext, MagneticFieldContext);
        let options = PropagatorOptions {
            geo_context: &gctx,
            mag_field_context: &mctx,
            plain: PropagatorPlainOptions::default(),
        };

        let mut visited = Vec::new();
        let summary = propagator
            .propagate(&start(), &options, &[], &SurfaceRecorder, &Never, &mut visited)
            .unwrap();

        // The curvilinear start surface comes first
        assert_eq!(visited, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0]);
        // Past the last plane one unconstrained step is taken before stopping
        assert_eq!(summary.steps, 6);
        assert!((summary.path_length - (500.0 + 10.0 * M)).abs() < 1e-9);
    }

    #[test]
    fn test_step_count_limit() {
        let geometry = Arc::new(TrackingGeometry::telescope(&TelescopeConfig::default()));
        let propagator = Propagator::new(StraightLineStepper, Navigator::Default(geometry));
        let (gctx, mctx) = (GeometryContext, MagneticFieldContext);
        let options = PropagatorOptions {
            geo_context: &gctx,
            mag_field_context: &mctx,
            plain: PropagatorPlainOptions {
                max_steps: 2,
                ..PropagatorPlainOptions::default()
            },
        };

        let mut visited = Vec::new();
        let err = propagator
            .propagate(&start(), &options, &[], &SurfaceRecorder, &Never, &mut visited)
            .unwrap_err();
        assert_eq!(err, PropagatorError::StepCountLimitReached(2));
        assert_eq!(visited, vec![0.0, 100.0, 200.0]);
    }
}

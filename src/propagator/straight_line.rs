use super::stepper::{Stepper, StepperState};
use crate::error::PropagatorError;
use crate::types::*;
use nalgebra::Matrix3;

/// Field-free transport along straight lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct StraightLineStepper;

impl StraightLineStepper {
    pub fn new() -> Self {
        Self
    }
}

impl Stepper for StraightLineStepper {
    fn step(&self, state: &mut StepperState) -> Result<f64, PropagatorError> {
        let magnitude = state.step_size.value();
        if !(magnitude.is_finite() && magnitude < f64::MAX) {
            return Err(PropagatorError::InvalidStep(format!(
                "unbounded step size {}",
                magnitude
            )));
        }
        let h = state.nav_dir.sign() * magnitude;

        let direction = self.direction(state);
        let qop = self.qop(state);
        let mass = state.mass;
        // dt/ds = E/p
        let dtds = (1.0 + mass * mass * qop * qop).sqrt();

        for i in 0..3 {
            state.pars[FREE_POS0 + i] += h * direction[i];
        }
        state.pars[FREE_TIME] += h * dtds;

        if state.cov_transport {
            let mut step_jacobian = FreeMatrix::identity();
            step_jacobian
                .fixed_view_mut::<3, 3>(FREE_POS0, FREE_DIR0)
                .copy_from(&(Matrix3::identity() * h));
            step_jacobian[(FREE_TIME, FREE_QOP)] = h * mass * mass * qop / dtds;
            state.jac_transport = step_jacobian * state.jac_transport;

            state.derivative.fill(0.0);
            state
                .derivative
                .fixed_rows_mut::<3>(FREE_POS0)
                .copy_from(&direction);
            state.derivative[FREE_TIME] = dtds;
        }

        state.previous_step_size = h;
        state.path_accumulated += h;
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_data::BoundTrackParameters;
    use crate::units::{GEV, PION_MASS};
    use nalgebra::Vector3;

    fn state(nav_dir: NavigationDirection, max_step: f64) -> StepperState {
        let gctx = GeometryContext;
        let params = BoundTrackParameters::curvilinear(
            &gctx,
            Vector3::zeros(),
            Vector3::new(1.0, 1.0, 0.0),
            1.0 / GEV,
            0.0,
            Some(BoundMatrix::identity()),
        );
        StepperState::new(&gctx, &params, nav_dir, max_step, PION_MASS)
    }

    #[test]
    fn test_step_moves_along_direction() {
        let stepper = StraightLineStepper::new();
        let mut state = state(NavigationDirection::Forward, 10.0);

        let h = stepper.step(&mut state).unwrap();
        assert_eq!(h, 10.0);
        let expected = 10.0 / 2.0_f64.sqrt();
        assert!((stepper.position(&state).x - expected).abs() < 1e-12);
        assert!((stepper.position(&state).y - expected).abs() < 1e-12);
        assert!((state.path_accumulated - 10.0).abs() < 1e-12);
        assert!(stepper.time(&state) > 10.0);
    }

    #[test]
    fn test_backward_step() {
        let stepper = StraightLineStepper::new();
        let mut state = state(NavigationDirection::Backward, 4.0);

        let h = stepper.step(&mut state).unwrap();
        assert_eq!(h, -4.0);
        assert!(stepper.position(&state).x < 0.0);
        assert!((state.path_accumulated + 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_transport_jacobian_accumulates() {
        let stepper = StraightLineStepper::new();
        let mut state = state(NavigationDirection::Forward, 5.0);
        stepper.step(&mut state).unwrap();
        stepper.step(&mut state).unwrap();

        assert!((state.jac_transport[(FREE_POS0, FREE_DIR0)] - 10.0).abs() < 1e-12);
        assert!((state.derivative[FREE_TIME] - (1.0 + PION_MASS * PION_MASS).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_unbounded_step_is_rejected() {
        let stepper = StraightLineStepper::new();
        let mut state = state(NavigationDirection::Forward, f64::INFINITY);
        assert!(matches!(
            stepper.step(&mut state),
            Err(PropagatorError::InvalidStep(_))
        ));
    }
}

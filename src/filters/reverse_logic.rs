use super::extensions::ReverseFilteringLogic;
use crate::event_data::TrackState;
use crate::types::BOUND_QOP;

/// Reverse-filter low momentum tracks, where material effects make the
/// smoother's linearisation poor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MomentumReverseLogic {
    /// Momentum below which to reverse (GeV)
    pub momentum_max: f64,
}

impl MomentumReverseLogic {
    pub fn new(momentum_max: f64) -> Self {
        Self { momentum_max }
    }
}

impl ReverseFilteringLogic for MomentumReverseLogic {
    fn do_reverse_filtering(&self, state: &TrackState) -> bool {
        state.filtered.as_ref().map_or(false, |filtered| {
            let qop = filtered.parameters[BOUND_QOP];
            qop != 0.0 && 1.0 / qop.abs() < self.momentum_max
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_data::{MultiTrajectory, ParameterEstimate};
    use crate::geometry::PlaneSurface;
    use crate::types::*;
    use nalgebra::Vector3;

    #[test]
    fn test_threshold() {
        let mut traj = MultiTrajectory::new();
        let index = traj.add_track_state(PlaneSurface::new(Vector3::zeros(), Vector3::x()).into_shared(), None);
        let logic = MomentumReverseLogic::new(1.0);
        assert!(!logic.do_reverse_filtering(&traj[index]));

        let mut params = BoundVector::zeros();
        params[BOUND_QOP] = -2.0;
        traj[index].filtered = Some(ParameterEstimate::new(params, BoundMatrix::identity()));
        assert!(logic.do_reverse_filtering(&traj[index]));

        params[BOUND_QOP] = 0.5;
        traj[index].filtered = Some(ParameterEstimate::new(params, BoundMatrix::identity()));
        assert!(!logic.do_reverse_filtering(&traj[index]));
    }
}

use super::extensions::OutlierFinder;
use crate::event_data::TrackState;
use crate::measurement_selector::measurement_chi2;
use log::{debug, warn};

/// Flags measurements whose predicted chi² exceeds a cut.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chi2OutlierFinder {
    pub chi2_cut: f64,
}

impl Chi2OutlierFinder {
    pub fn new(chi2_cut: f64) -> Self {
        Self { chi2_cut }
    }
}

impl OutlierFinder for Chi2OutlierFinder {
    fn is_outlier(&self, state: &TrackState) -> bool {
        let (Some(calibrated), Some(predicted)) = (&state.calibrated, &state.predicted) else {
            return false;
        };
        match measurement_chi2(calibrated, predicted) {
            Ok(chi2) if chi2 > self.chi2_cut => {
                debug!("State {} is an outlier, chi2 {:.2} > {:.2}", state.index(), chi2, self.chi2_cut);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Outlier check on state {} failed: {}", state.index(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_data::{Measurement, MultiTrajectory, ParameterEstimate};
    use crate::geometry::PlaneSurface;
    use crate::types::*;
    use nalgebra::Vector3;

    fn trajectory(measured: f64) -> MultiTrajectory {
        let mut traj = MultiTrajectory::new();
        let index = traj.add_track_state(PlaneSurface::new(Vector3::zeros(), Vector3::x()).into_shared(), None);
        let link = SourceLink::new(GeometryId::new(1), 0);
        traj[index].calibrated = Some(
            Measurement::diagonal(link, &[BOUND_LOC0], &[measured], &[1.0])
                .unwrap()
                .calibrate(),
        );
        traj[index].predicted = Some(ParameterEstimate::new(BoundVector::zeros(), BoundMatrix::zeros()));
        traj
    }

    #[test]
    fn test_cut() {
        let finder = Chi2OutlierFinder::new(9.0);
        assert!(!finder.is_outlier(&trajectory(2.0)[0]));
        assert!(finder.is_outlier(&trajectory(4.0)[0]));
    }

    #[test]
    fn test_incomplete_state_is_not_outlier() {
        let finder = Chi2OutlierFinder::new(0.0);
        let mut traj = trajectory(4.0);
        traj[0].predicted = None;
        assert!(!finder.is_outlier(&traj[0]));
    }
}

//! Pluggable kernels of the Kalman fitter
//!
//! Every kernel is optional. A calibrator, updater or smoother that was never
//! supplied fails the fit the first time it is needed. A missing outlier
//! finder flags nothing and a missing reverse-filtering logic never reverses.

use crate::error::{KalmanFitterError, Result};
use crate::event_data::{MultiTrajectory, TrackState};
use crate::types::*;
use std::fmt;

/// Attaches a calibrated measurement to a state carrying a source link.
pub trait Calibrator: Send + Sync {
    fn calibrate(
        &self,
        gctx: &GeometryContext,
        cctx: &CalibrationContext,
        state: &mut TrackState,
    ) -> Result<()>;
}

/// Fills the filtered estimate of a state from its prediction and measurement.
pub trait Updater: Send + Sync {
    fn update(&self, gctx: &GeometryContext, state: &mut TrackState, nav_dir: NavigationDirection) -> Result<()>;
}

/// Fills smoothed estimates along the chain ending at `entry_index`.
pub trait Smoother: Send + Sync {
    fn smooth(&self, gctx: &GeometryContext, trajectory: &mut MultiTrajectory, entry_index: usize) -> Result<()>;
}

pub trait OutlierFinder: Send + Sync {
    fn is_outlier(&self, state: &TrackState) -> bool;
}

/// Decides, from the last measurement state, whether to run the reversed filter
/// instead of the smoother.
pub trait ReverseFilteringLogic: Send + Sync {
    fn do_reverse_filtering(&self, state: &TrackState) -> bool;
}

impl<F> OutlierFinder for F
where
    F: Fn(&TrackState) -> bool + Send + Sync,
{
    fn is_outlier(&self, state: &TrackState) -> bool {
        self(state)
    }
}

impl<F> ReverseFilteringLogic for F
where
    F: Fn(&TrackState) -> bool + Send + Sync,
{
    fn do_reverse_filtering(&self, state: &TrackState) -> bool {
        self(state)
    }
}

#[derive(Clone, Copy, Default)]
pub struct KalmanFitterExtensions<'a> {
    pub calibrator: Option<&'a dyn Calibrator>,
    pub updater: Option<&'a dyn Updater>,
    pub smoother: Option<&'a dyn Smoother>,
    pub outlier_finder: Option<&'a dyn OutlierFinder>,
    pub reverse_filtering_logic: Option<&'a dyn ReverseFilteringLogic>,
}

impl<'a> KalmanFitterExtensions<'a> {
    pub fn with_calibrator(mut self, calibrator: &'a dyn Calibrator) -> Self {
        self.calibrator = Some(calibrator);
        self
    }

    pub fn with_updater(mut self, updater: &'a dyn Updater) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn with_smoother(mut self, smoother: &'a dyn Smoother) -> Self {
        self.smoother = Some(smoother);
        self
    }

    pub fn with_outlier_finder(mut self, outlier_finder: &'a dyn OutlierFinder) -> Self {
        self.outlier_finder = Some(outlier_finder);
        self
    }

    pub fn with_reverse_filtering_logic(mut self, logic: &'a dyn ReverseFilteringLogic) -> Self {
        self.reverse_filtering_logic = Some(logic);
        self
    }

    pub(crate) fn calibrate(
        &self,
        gctx: &GeometryContext,
        cctx: &CalibrationContext,
        state: &mut TrackState,
    ) -> Result<()> {
        self.calibrator
            .ok_or(KalmanFitterError::ExtensionNotConfigured("calibrator"))?
            .calibrate(gctx, cctx, state)
    }

    pub(crate) fn update(
        &self,
        gctx: &GeometryContext,
        state: &mut TrackState,
        nav_dir: NavigationDirection,
    ) -> Result<()> {
        self.updater
            .ok_or(KalmanFitterError::ExtensionNotConfigured("updater"))?
            .update(gctx, state, nav_dir)
    }

    pub(crate) fn smooth(
        &self,
        gctx: &GeometryContext,
        trajectory: &mut MultiTrajectory,
        entry_index: usize,
    ) -> Result<()> {
        self.smoother
            .ok_or(KalmanFitterError::ExtensionNotConfigured("smoother"))?
            .smooth(gctx, trajectory, entry_index)
    }

    pub(crate) fn is_outlier(&self, state: &TrackState) -> bool {
        self.outlier_finder
            .map_or(false, |finder| finder.is_outlier(state))
    }

    pub(crate) fn do_reverse_filtering(&self, state: &TrackState) -> bool {
        self.reverse_filtering_logic
            .map_or(false, |logic| logic.do_reverse_filtering(state))
    }
}

impl fmt::Debug for KalmanFitterExtensions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KalmanFitterExtensions")
            .field("calibrator", &self.calibrator.is_some())
            .field("updater", &self.updater.is_some())
            .field("smoother", &self.smoother.is_some())
            .field("outlier_finder", &self.outlier_finder.is_some())
            .field("reverse_filtering_logic", &self.reverse_filtering_logic.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PlaneSurface;
    use nalgebra::Vector3;

    fn trajectory_with_state() -> MultiTrajectory {
        let mut traj = MultiTrajectory::new();
        traj.add_track_state(PlaneSurface::new(Vector3::zeros(), Vector3::x()).into_shared(), None);
        traj
    }

    #[test]
    fn test_missing_kernels_fail_loudly() {
        let extensions = KalmanFitterExtensions::default();
        let mut traj = trajectory_with_state();
        let gctx = GeometryContext;

        assert_eq!(
            extensions.calibrate(&gctx, &CalibrationContext, &mut traj[0]),
            Err(KalmanFitterError::ExtensionNotConfigured("calibrator"))
        );
        assert_eq!(
            extensions.update(&gctx, &mut traj[0], NavigationDirection::Forward),
            Err(KalmanFitterError::ExtensionNotConfigured("updater"))
        );
        assert_eq!(
            extensions.smooth(&gctx, &mut traj, 0),
            Err(KalmanFitterError::ExtensionNotConfigured("smoother"))
        );
    }

    #[test]
    fn test_missing_predicates_say_no() {
        let extensions = KalmanFitterExtensions::default();
        let traj = trajectory_with_state();
        assert!(!extensions.is_outlier(&traj[0]));
        assert!(!extensions.do_reverse_filtering(&traj[0]));
    }

    #[test]
    fn test_closures_as_predicates() {
        let always = |_: &TrackState| true;
        let extensions = KalmanFitterExtensions::default()
            .with_outlier_finder(&always)
            .with_reverse_filtering_logic(&always);
        let traj = trajectory_with_state();
        assert!(extensions.is_outlier(&traj[0]));
        assert!(extensions.do_reverse_filtering(&traj[0]));
        assert!(format!("{:?}", extensions).contains("outlier_finder: true"));
    }
}

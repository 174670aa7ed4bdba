use super::extensions::Calibrator;
use crate::error::{KalmanFitterError, Result};
use crate::event_data::{Measurement, TrackState};
use crate::types::*;

/// Resolves source links by index into an owned measurement container.
#[derive(Clone, Debug, Default)]
pub struct MeasurementCalibrator {
    measurements: Vec<Measurement>,
}

impl MeasurementCalibrator {
    pub fn new(measurements: Vec<Measurement>) -> Self {
        Self { measurements }
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn source_links(&self) -> Vec<SourceLink> {
        self.measurements.iter().map(|m| *m.source_link()).collect()
    }
}

impl Calibrator for MeasurementCalibrator {
    fn calibrate(
        &self,
        _gctx: &GeometryContext,
        _cctx: &CalibrationContext,
        state: &mut TrackState,
    ) -> Result<()> {
        let link = state
            .uncalibrated
            .ok_or_else(|| KalmanFitterError::CalibrationFailed("state has no source link".into()))?;
        let measurement = self.measurements.get(link.index).ok_or_else(|| {
            KalmanFitterError::CalibrationFailed(format!("no measurement with index {}", link.index))
        })?;
        if measurement.source_link().geometry_id != link.geometry_id {
            return Err(KalmanFitterError::CalibrationFailed(format!(
                "measurement {} is on {}, source link points to {}",
                link.index,
                measurement.source_link().geometry_id,
                link.geometry_id
            )));
        }
        state.calibrated = Some(measurement.calibrate());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_data::MultiTrajectory;
    use crate::geometry::PlaneSurface;
    use nalgebra::Vector3;

    fn calibrator() -> MeasurementCalibrator {
        let link = SourceLink::new(GeometryId::new(7), 0);
        MeasurementCalibrator::new(vec![
            Measurement::diagonal(link, &[BOUND_LOC0], &[0.5], &[0.01]).unwrap(),
        ])
    }

    fn state(link: Option<SourceLink>) -> MultiTrajectory {
        let mut traj = MultiTrajectory::new();
        let index = traj.add_track_state(PlaneSurface::new(Vector3::zeros(), Vector3::x()).into_shared(), None);
        traj[index].uncalibrated = link;
        traj
    }

    #[test]
    fn test_calibrates_matching_link() {
        let mut traj = state(Some(SourceLink::new(GeometryId::new(7), 0)));
        calibrator()
            .calibrate(&GeometryContext, &CalibrationContext, &mut traj[0])
            .unwrap();
        let calibrated = traj[0].calibrated.as_ref().unwrap();
        assert_eq!(calibrated.size, 1);
        assert_eq!(calibrated.parameters[0], 0.5);
    }

    #[test]
    fn test_rejects_bad_links() {
        let cal = calibrator();
        for link in [
            None,
            Some(SourceLink::new(GeometryId::new(7), 3)),
            Some(SourceLink::new(GeometryId::new(8), 0)),
        ] {
            let mut traj = state(link);
            assert!(matches!(
                cal.calibrate(&GeometryContext, &CalibrationContext, &mut traj[0]),
                Err(KalmanFitterError::CalibrationFailed(_))
            ));
        }
    }
}

use crate::error::KalmanFitterError;
use crate::event_data::{BoundTrackParameters, MultiTrajectory, TrackStateFlag};
use crate::geometry::SurfaceRef;
use serde::Serialize;

/// Everything one fit produced, including partial output of a failed fit.
#[derive(Clone, Debug)]
pub struct KalmanFitterResult {
    pub fitted_states: MultiTrajectory,
    /// Last state tagged as a measurement
    pub last_measurement_index: Option<usize>,
    /// Last state appended during the forward pass
    pub last_track_index: Option<usize>,
    /// Parameters on the reference surface, when one was requested
    pub fitted_parameters: Option<BoundTrackParameters>,
    pub measurement_states: usize,
    pub measurement_holes: usize,
    pub processed_states: usize,
    pub smoothed: bool,
    pub reversed: bool,
    pub finished: bool,
    /// Active surfaces crossed without a measurement after the first one
    pub missed_active_surfaces: Vec<SurfaceRef>,
    /// Surfaces revisited by the reversed filter
    pub passed_again_surfaces: Vec<SurfaceRef>,
    pub result: Result<(), KalmanFitterError>,
}

impl Default for KalmanFitterResult {
    fn default() -> Self {
        Self {
            fitted_states: MultiTrajectory::new(),
            last_measurement_index: None,
            last_track_index: None,
            fitted_parameters: None,
            measurement_states: 0,
            measurement_holes: 0,
            processed_states: 0,
            smoothed: false,
            reversed: false,
            finished: false,
            missed_active_surfaces: Vec::new(),
            passed_again_surfaces: Vec::new(),
            result: Ok(()),
        }
    }
}

impl KalmanFitterResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Sum of the chi² of all measurement states on the forward chain.
    pub fn chi2_sum(&self) -> f64 {
        self.last_track_index.map_or(0.0, |tip| {
            self.fitted_states
                .backwards(tip)
                .filter(|state| state.type_flags.test(TrackStateFlag::Measurement))
                .map(|state| state.chi2)
                .sum()
        })
    }

    /// Number of degrees of freedom of the measurements, minus the fitted parameters.
    pub fn ndf(&self) -> i64 {
        let measured: usize = self.last_track_index.map_or(0, |tip| {
            self.fitted_states
                .backwards(tip)
                .filter(|state| state.type_flags.test(TrackStateFlag::Measurement))
                .filter_map(|state| state.calibrated.as_ref().map(|c| c.size))
                .sum()
        });
        measured as i64 - crate::types::BOUND_SIZE as i64
    }

    pub fn summary(&self) -> FitSummary {
        let fitted_parameters = self
            .fitted_parameters
            .as_ref()
            .map(|p| p.parameters().iter().copied().collect());
        FitSummary {
            success: self.result.is_ok(),
            error: self.result.as_ref().err().map(|e| e.to_string()),
            measurement_states: self.measurement_states,
            measurement_holes: self.measurement_holes,
            processed_states: self.processed_states,
            track_states: self.fitted_states.len(),
            smoothed: self.smoothed,
            reversed: self.reversed,
            chi2_sum: self.chi2_sum(),
            ndf: self.ndf(),
            fitted_parameters,
        }
    }
}

/// Serializable digest of a [`KalmanFitterResult`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FitSummary {
    pub success: bool,
    pub error: Option<String>,
    pub measurement_states: usize,
    pub measurement_holes: usize,
    pub processed_states: usize,
    pub track_states: usize,
    pub smoothed: bool,
    pub reversed: bool,
    pub chi2_sum: f64,
    pub ndf: i64,
    /// (loc0, loc1, phi, theta, q/p, t) on the reference surface
    pub fitted_parameters: Option<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result() {
        let result = KalmanFitterResult::default();
        assert!(result.is_ok());
        assert_eq!(result.chi2_sum(), 0.0);

        let summary = result.summary();
        assert!(summary.success);
        assert_eq!(summary.track_states, 0);
        assert!(summary.fitted_parameters.is_none());
    }

    #[test]
    fn test_summary_serializes_error() {
        let result = KalmanFitterResult {
            result: Err(KalmanFitterError::NoMeasurementFound),
            ..KalmanFitterResult::default()
        };
        let json = serde_json::to_string(&result.summary()).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("No measurement detected"));
    }
}

//! Creation of track states on the surfaces the forward filter visits

use super::extensions::KalmanFitterExtensions;
use crate::error::Result;
use crate::event_data::{MultiTrajectory, ParameterEstimate, TrackState, TrackStateFlag};
use crate::geometry::SurfaceRef;
use crate::propagator::{BoundState, FreeToBoundCorrection, PropagatorState, Stepper};
use crate::types::*;
use log::{debug, error, trace};

fn fill_prediction(track_state: &mut TrackState, bound: &BoundState) {
    let covariance = bound
        .parameters
        .covariance()
        .copied()
        .unwrap_or_else(BoundMatrix::zeros);
    track_state.predicted = Some(ParameterEstimate::new(*bound.parameters.parameters(), covariance));
    track_state.jacobian = Some(bound.jacobian);
    track_state.path_length = bound.path_length;
}

/// Append a state for `source_link`, calibrate it and run the update unless
/// the outlier finder rejects it.
///
/// Returns the index of the new state. Outliers keep their prediction as
/// filtered estimate.
#[allow(clippy::too_many_arguments)]
pub fn handle_measurement<S: Stepper>(
    state: &mut PropagatorState<'_>,
    stepper: &S,
    extensions: &KalmanFitterExtensions<'_>,
    calibration_context: &CalibrationContext,
    surface: &SurfaceRef,
    source_link: SourceLink,
    trajectory: &mut MultiTrajectory,
    previous: Option<usize>,
    transport_cov: bool,
    free_to_bound_correction: &FreeToBoundCorrection,
) -> Result<usize> {
    let gctx = state.geo_context;
    let bound = stepper.bound_state(
        gctx,
        &mut state.stepping,
        surface,
        transport_cov,
        free_to_bound_correction,
    )?;

    let index = trajectory.add_track_state(surface.clone(), previous);
    let track_state = &mut trajectory[index];
    track_state.uncalibrated = Some(source_link);
    fill_prediction(track_state, &bound);

    extensions.calibrate(gctx, calibration_context, track_state)?;

    track_state.type_flags.set(TrackStateFlag::Parameter);
    if surface.surface_material().is_some() {
        track_state.type_flags.set(TrackStateFlag::Material);
    }

    if extensions.is_outlier(track_state) {
        debug!("Measurement on {} flagged as outlier", surface.geometry_id());
        track_state.type_flags.set(TrackStateFlag::Outlier);
        track_state.filtered = track_state.predicted.clone();
    } else {
        if let Err(e) = extensions.update(gctx, track_state, state.stepping.nav_dir) {
            error!("Update on {} failed: {}", surface.geometry_id(), e);
            return Err(e);
        }
        track_state.type_flags.set(TrackStateFlag::Measurement);
    }

    Ok(index)
}

/// Append a state on a surface without measurement.
///
/// # Arguments
/// * `hole` - Tag the state as a hole, for sensitive surfaces after the
///   first measurement
#[allow(clippy::too_many_arguments)]
pub fn handle_no_measurement<S: Stepper>(
    state: &mut PropagatorState<'_>,
    stepper: &S,
    surface: &SurfaceRef,
    trajectory: &mut MultiTrajectory,
    previous: Option<usize>,
    hole: bool,
    transport_cov: bool,
    free_to_bound_correction: &FreeToBoundCorrection,
) -> Result<usize> {
    let bound = stepper.bound_state(
        state.geo_context,
        &mut state.stepping,
        surface,
        transport_cov,
        free_to_bound_correction,
    )?;

    let index = trajectory.add_track_state(surface.clone(), previous);
    let track_state = &mut trajectory[index];
    fill_prediction(track_state, &bound);

    track_state.type_flags.set(TrackStateFlag::Parameter);
    if surface.surface_material().is_some() {
        track_state.type_flags.set(TrackStateFlag::Material);
    }
    if hole {
        trace!("Hole on {}", surface.geometry_id());
        track_state.type_flags.set(TrackStateFlag::Hole);
    }
    track_state.filtered = track_state.predicted.clone();

    Ok(index)
}

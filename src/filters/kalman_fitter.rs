//! Kalman track fit driven by the propagator
//!
//! The fit is a single propagation. [`KalmanActor`] runs after every step:
//! on the way out it filters measurements, records holes and applies
//! material effects. Once all measurements are used, or navigation runs out
//! of surfaces, it either smooths the trajectory and heads for the reference
//! surface, or flips the navigation direction and filters the measurements a
//! second time in reverse. [`KalmanAborter`] stops the propagation when the
//! actor finishes or fails.

use super::extensions::KalmanFitterExtensions;
use super::kalman_result::KalmanFitterResult;
use super::options::KalmanFitterOptions;
use super::update_helpers::{handle_measurement, handle_no_measurement};
use crate::error::{KalmanFitterError, PropagatorError, Result};
use crate::event_data::{
    free_direction, free_position, transform_bound_to_free, BoundTrackParameters, MeasurementIndex,
    ParameterEstimate, TrackState, TrackStateFlag,
};
use crate::geometry::{same_surface, SurfaceRef};
use crate::material::{MaterialUpdateStage, PointwiseMaterialInteraction};
use crate::propagator::{
    Aborter, Actor, FreeToBoundCorrection, Propagator, PropagatorOptions, PropagatorState, Stepper,
    SurfaceReached,
};
use crate::types::*;
use log::{debug, error, trace};

/// Propagation actor carrying out the forward filter, the smoothing or
/// reversed filtering and the final transport to the reference surface.
pub struct KalmanActor<'a> {
    /// Where the fitted parameters are expressed
    pub target_surface: Option<SurfaceRef>,
    pub input_measurements: &'a MeasurementIndex,
    pub multiple_scattering: bool,
    pub energy_loss: bool,
    pub reversed_filtering: bool,
    pub reversed_filtering_covariance_scaling: f64,
    pub free_to_bound_correction: FreeToBoundCorrection,
    pub extensions: KalmanFitterExtensions<'a>,
    pub calibration_context: &'a CalibrationContext,
    /// The direct navigator does not take external surfaces
    pub direct_navigation: bool,
    target_reached: SurfaceReached,
}

impl<'a> KalmanActor<'a> {
    pub fn new(
        input_measurements: &'a MeasurementIndex,
        options: &KalmanFitterOptions<'a>,
        direct_navigation: bool,
    ) -> Self {
        Self {
            target_surface: options.reference_surface.clone(),
            input_measurements,
            multiple_scattering: options.multiple_scattering,
            energy_loss: options.energy_loss,
            reversed_filtering: options.reversed_filtering,
            reversed_filtering_covariance_scaling: options.reversed_filtering_covariance_scaling,
            free_to_bound_correction: options.free_to_bound_correction,
            extensions: options.extensions,
            calibration_context: options.calibration_context,
            direct_navigation,
            target_reached: SurfaceReached,
        }
    }

    /// Forward filtering step on `surface`.
    fn filter<S: Stepper>(
        &self,
        surface: &SurfaceRef,
        state: &mut PropagatorState<'_>,
        stepper: &S,
        result: &mut KalmanFitterResult,
    ) -> Result<()> {
        let gctx = state.geo_context;

        if let Some(source_link) = self.input_measurements.get(surface.geometry_id()).copied() {
            trace!("Measurement surface {} detected", surface.geometry_id());
            // Covariance on the surface before the pre-update material noise
            stepper.transport_covariance_to_bound(
                gctx,
                &mut state.stepping,
                surface.as_ref(),
                &self.free_to_bound_correction,
            );
            self.material_interactor(surface, state, stepper, MaterialUpdateStage::PreUpdate);

            let index = handle_measurement(
                state,
                stepper,
                &self.extensions,
                self.calibration_context,
                surface,
                source_link,
                &mut result.fitted_states,
                result.last_track_index,
                false,
                &self.free_to_bound_correction,
            )?;
            result.last_track_index = Some(index);

            let track_state = &result.fitted_states[index];
            if track_state.type_flags.test(TrackStateFlag::Measurement) {
                if let Some(filtered) = track_state.filtered.clone() {
                    let free = transform_bound_to_free(gctx, surface.as_ref(), &filtered.parameters);
                    stepper.update(
                        gctx,
                        &mut state.stepping,
                        &free,
                        &filtered.parameters,
                        &filtered.covariance,
                        surface.as_ref(),
                    );
                }
                result.measurement_states += 1;
                result.last_measurement_index = Some(index);
            }

            self.material_interactor(surface, state, stepper, MaterialUpdateStage::PostUpdate);

            result.processed_states += 1;
            result.measurement_holes = result.missed_active_surfaces.len();
        } else if surface.associated_detector_element().is_some()
            || surface.surface_material().is_some()
        {
            let has_material = surface.surface_material().is_some();
            // States before the first measurement are only kept for material
            if result.measurement_states > 0 || has_material {
                let hole = surface.associated_detector_element().is_some() && result.measurement_states > 0;
                let index = handle_no_measurement(
                    state,
                    stepper,
                    surface,
                    &mut result.fitted_states,
                    result.last_track_index,
                    hole,
                    true,
                    &self.free_to_bound_correction,
                )?;
                result.last_track_index = Some(index);
                if result.fitted_states[index].type_flags.test(TrackStateFlag::Hole) {
                    result.missed_active_surfaces.push(surface.clone());
                }
                result.processed_states += 1;
            }

            if has_material {
                self.material_interactor(surface, state, stepper, MaterialUpdateStage::FullUpdate);
            }
        }
        Ok(())
    }

    /// Filtering step on `surface` after the direction was reversed. The
    /// result lands in the smoothed slot of the forward state on the same
    /// surface.
    fn reversed_filter<S: Stepper>(
        &self,
        surface: &SurfaceRef,
        state: &mut PropagatorState<'_>,
        stepper: &S,
        result: &mut KalmanFitterResult,
    ) -> Result<()> {
        let gctx = state.geo_context;

        if let Some(source_link) = self.input_measurements.get(surface.geometry_id()).copied() {
            // The reversal point already has its smoothed estimate
            let on_start = state
                .navigation
                .start_surface
                .as_ref()
                .map_or(false, |start| same_surface(start, surface));
            if on_start {
                self.material_interactor(surface, state, stepper, MaterialUpdateStage::FullUpdate);
                return Ok(());
            }

            trace!("Reversed filtering on measurement surface {}", surface.geometry_id());
            stepper.transport_covariance_to_bound(
                gctx,
                &mut state.stepping,
                surface.as_ref(),
                &self.free_to_bound_correction,
            );
            self.material_interactor(surface, state, stepper, MaterialUpdateStage::PreUpdate);

            let filtered = self.reversed_update(surface, source_link, state, stepper, result)?;

            if let Some(tip) = result.last_measurement_index {
                let mut found = false;
                result.fitted_states.apply_backwards(tip, |track_state| {
                    if same_surface(track_state.reference_surface(), surface) {
                        track_state.smoothed = Some(filtered.clone());
                        found = true;
                        return false;
                    }
                    true
                });
                if found {
                    result.passed_again_surfaces.push(surface.clone());
                }
            }

            let free = transform_bound_to_free(gctx, surface.as_ref(), &filtered.parameters);
            stepper.update(
                gctx,
                &mut state.stepping,
                &free,
                &filtered.parameters,
                &filtered.covariance,
                surface.as_ref(),
            );
            self.material_interactor(surface, state, stepper, MaterialUpdateStage::PostUpdate);
        } else if surface.associated_detector_element().is_some()
            || surface.surface_material().is_some()
        {
            if state.stepping.cov_transport {
                if surface.associated_detector_element().is_some() {
                    stepper.transport_covariance_to_bound(
                        gctx,
                        &mut state.stepping,
                        surface.as_ref(),
                        &self.free_to_bound_correction,
                    );
                } else {
                    stepper.transport_covariance_to_curvilinear(gctx, &mut state.stepping);
                }
            }
            stepper.set_identity_jacobian(&mut state.stepping);

            if surface.surface_material().is_some() {
                self.material_interactor(surface, state, stepper, MaterialUpdateStage::FullUpdate);
            }
        }
        Ok(())
    }

    /// Update a detached state, not linked into the forward chain.
    fn reversed_update<S: Stepper>(
        &self,
        surface: &SurfaceRef,
        source_link: SourceLink,
        state: &mut PropagatorState<'_>,
        stepper: &S,
        result: &mut KalmanFitterResult,
    ) -> Result<ParameterEstimate> {
        let gctx = state.geo_context;
        let bound = stepper.bound_state(
            gctx,
            &mut state.stepping,
            surface,
            false,
            &self.free_to_bound_correction,
        )?;

        let index = result.fitted_states.add_track_state(surface.clone(), None);
        let track_state = &mut result.fitted_states[index];
        track_state.uncalibrated = Some(source_link);
        track_state.predicted = Some(ParameterEstimate::new(
            *bound.parameters.parameters(),
            bound.parameters.covariance().copied().unwrap_or_else(BoundMatrix::zeros),
        ));
        track_state.jacobian = Some(bound.jacobian);
        track_state.path_length = bound.path_length;

        self.extensions
            .calibrate(gctx, self.calibration_context, track_state)?;
        self.extensions
            .update(gctx, track_state, state.stepping.nav_dir)
            .map_err(|e| {
                error!("Reversed update on {} failed: {}", surface.geometry_id(), e);
                KalmanFitterError::BackwardUpdateFailed
            })?;
        track_state.type_flags.set(TrackStateFlag::Parameter);
        track_state.type_flags.set(TrackStateFlag::Measurement);

        track_state
            .filtered
            .clone()
            .ok_or(KalmanFitterError::BackwardUpdateFailed)
    }

    /// Flip the direction and restart from the last measurement state.
    fn reverse<S: Stepper>(
        &self,
        state: &mut PropagatorState<'_>,
        stepper: &S,
        result: &mut KalmanFitterResult,
    ) -> Result<()> {
        let last = result
            .last_measurement_index
            .ok_or(KalmanFitterError::ReverseNavigationFailed)?;
        let gctx = state.geo_context;

        let nav_dir = state.stepping.nav_dir.invert();
        state.options.direction = nav_dir;
        state.options.max_step_size = -state.options.max_step_size;
        state.options.path_limit = -state.options.path_limit;

        let track_state = &mut result.fitted_states[last];
        let filtered = track_state
            .filtered
            .clone()
            .ok_or(KalmanFitterError::ReverseNavigationFailed)?;
        let surface = track_state.reference_surface().clone();
        let covariance = filtered.covariance * self.reversed_filtering_covariance_scaling;
        stepper.reset_state(
            gctx,
            &mut state.stepping,
            &filtered.parameters,
            &covariance,
            surface.as_ref(),
            nav_dir,
            state.options.max_step_size,
        );
        // The reversal point is not filtered again
        track_state.smoothed = Some(filtered);
        result.passed_again_surfaces.push(surface.clone());

        state.navigation.reset(surface.clone(), self.target_surface.clone());
        self.material_interactor(&surface, state, stepper, MaterialUpdateStage::FullUpdate);

        debug!(
            "Reversed navigation to {} on {}",
            nav_dir,
            surface.geometry_id()
        );
        result.reversed = true;
        Ok(())
    }

    /// Smooth the forward trajectory, then restart from whichever end state
    /// lies closer to the target surface.
    fn finalize<S: Stepper>(
        &self,
        state: &mut PropagatorState<'_>,
        stepper: &S,
        result: &mut KalmanFitterResult,
    ) -> Result<()> {
        let last = result
            .last_measurement_index
            .ok_or(KalmanFitterError::SmoothFailed)?;
        let gctx = state.geo_context;

        let mut first = None;
        let mut n_states = 0;
        for track_state in result.fitted_states.backwards(last) {
            n_states += 1;
            let flags = track_state.type_flags;
            if flags.test(TrackStateFlag::Measurement) || flags.test(TrackStateFlag::Material) {
                first = Some(track_state.index());
            }
        }
        let first = first.ok_or(KalmanFitterError::SmoothFailed)?;
        debug!("Smoothing {} states", n_states);

        self.extensions
            .smooth(gctx, &mut result.fitted_states, last)?;
        result.smoothed = true;

        let Some(target) = &self.target_surface else {
            return Ok(());
        };

        let nav_sign = state.stepping.nav_dir.sign();
        let path_to_target = |track_state: &TrackState| -> Option<f64> {
            let free = track_state.free_smoothed(gctx)?;
            let direction = free_direction(&free) * nav_sign;
            let intersection = target.intersect(gctx, &free_position(&free), &direction, false);
            intersection.is_valid().then_some(intersection.path_length)
        };
        let first_path = path_to_target(&result.fitted_states[first]);
        let last_path = path_to_target(&result.fitted_states[last]);
        let (start_index, path) = match (first_path, last_path) {
            (Some(f), Some(l)) if f.abs() <= l.abs() => (first, f),
            (_, Some(l)) => (last, l),
            (Some(f), None) => (first, f),
            (None, None) => {
                error!("Target surface {} is unreachable from the smoothed states", target.geometry_id());
                return Err(KalmanFitterError::SmoothFailed);
            }
        };

        let nav_dir = if path < 0.0 {
            state.stepping.nav_dir.invert()
        } else {
            state.stepping.nav_dir
        };
        state.options.direction = nav_dir;

        let track_state = &result.fitted_states[start_index];
        let smoothed = track_state
            .smoothed
            .clone()
            .ok_or(KalmanFitterError::SmoothFailed)?;
        let surface = track_state.reference_surface().clone();
        stepper.reset_state(
            gctx,
            &mut state.stepping,
            &smoothed.parameters,
            &smoothed.covariance,
            surface.as_ref(),
            nav_dir,
            state.options.max_step_size.abs(),
        );
        trace!(
            "Heading {} from state {} to target {} at {:.3} mm",
            nav_dir,
            start_index,
            target.geometry_id(),
            path
        );
        state.navigation.reset(surface, Some(target.clone()));
        Ok(())
    }

    fn material_interactor<S: Stepper>(
        &self,
        surface: &SurfaceRef,
        state: &mut PropagatorState<'_>,
        stepper: &S,
        stage: MaterialUpdateStage,
    ) {
        let mut interaction = PointwiseMaterialInteraction::new(surface, &state.stepping, stepper);
        if interaction.evaluate_material_slab(state.geo_context, stage) {
            interaction.evaluate(self.multiple_scattering, self.energy_loss);
            trace!(
                "Material on {} ({:?}): dE {:.4e} GeV, var(theta) {:.3e}",
                surface.geometry_id(),
                stage,
                interaction.e_loss,
                interaction.variance_theta
            );
            interaction.update_state(&mut state.stepping, stepper);
        }
    }

    fn finish<S: Stepper>(
        &self,
        state: &mut PropagatorState<'_>,
        stepper: &S,
        result: &mut KalmanFitterResult,
    ) -> Result<()> {
        // Drop the holes behind the last measurement
        result.missed_active_surfaces.truncate(result.measurement_holes);

        let reverse = self.reversed_filtering
            || result
                .last_measurement_index
                .map_or(false, |last| {
                    self.extensions
                        .do_reverse_filtering(&result.fitted_states[last])
                });
        if reverse {
            self.reverse(state, stepper, result)
        } else if result.last_measurement_index.is_none() {
            Err(KalmanFitterError::NoMeasurementFound)
        } else {
            self.finalize(state, stepper, result)
        }
    }
}

impl<S: Stepper> Actor<S> for KalmanActor<'_> {
    type Result = KalmanFitterResult;

    fn act(&self, state: &mut PropagatorState<'_>, stepper: &S, result: &mut KalmanFitterResult) {
        if result.finished {
            return;
        }
        trace!(
            "Kalman actor at {:?} going {}",
            stepper.position(&state.stepping),
            state.stepping.nav_dir
        );

        // Measurement surfaces may sit outside their bounds
        if result.processed_states == 0 && !self.direct_navigation {
            for geometry_id in self.input_measurements.geometry_ids() {
                state.navigation.insert_external_surface(geometry_id);
            }
        }

        if let Some(surface) = state.navigation.current_surface.clone() {
            let outcome = if result.reversed {
                self.reversed_filter(&surface, state, stepper, result)
            } else if !result.smoothed {
                self.filter(&surface, state, stepper, result)
            } else {
                Ok(())
            };
            if let Err(e) = outcome {
                error!("Filtering on {} failed: {}", surface.geometry_id(), e);
                result.result = Err(e);
                return;
            }
        }

        if !result.smoothed && !result.reversed {
            let all_used = result.measurement_states == self.input_measurements.len();
            let out_of_surfaces = result.measurement_states > 0 && state.navigation.navigation_break;
            if all_used || out_of_surfaces {
                if let Err(e) = self.finish(state, stepper, result) {
                    error!("Finishing the forward filter failed: {}", e);
                    result.result = Err(e);
                    return;
                }
            }
        }

        if result.smoothed || result.reversed {
            let Some(target) = self.target_surface.clone() else {
                if result.reversed {
                    error!("Reversed filtering needs a target surface to stop on");
                    result.result = Err(KalmanFitterError::BackwardUpdateFailed);
                } else {
                    result.finished = true;
                }
                return;
            };

            if self.target_reached.check(state, stepper, &target) {
                let bound = stepper.bound_state(
                    state.geo_context,
                    &mut state.stepping,
                    &target,
                    true,
                    &self.free_to_bound_correction,
                );
                match bound {
                    Ok(bound) => result.fitted_parameters = Some(bound.parameters),
                    Err(e) => {
                        error!("Binding to the target surface failed: {}", e);
                        result.result = Err(e.into());
                        return;
                    }
                }

                if result.reversed {
                    if let Some(tip) = result.last_measurement_index {
                        let passed = &result.passed_again_surfaces;
                        result.fitted_states.apply_backwards(tip, |track_state| {
                            let seen = passed
                                .iter()
                                .any(|s| same_surface(s, track_state.reference_surface()));
                            if !seen {
                                track_state.clear_smoothed();
                            }
                            true
                        });
                    }
                }
                debug!("Fit finished on target {}", target.geometry_id());
                result.finished = true;
            }
        }
    }
}

/// Stops the propagation once the fit finished or failed.
#[derive(Clone, Copy, Debug, Default)]
pub struct KalmanAborter;

impl Aborter<KalmanFitterResult> for KalmanAborter {
    fn should_abort(&self, _state: &PropagatorState<'_>, result: &KalmanFitterResult) -> bool {
        result.result.is_err() || result.finished
    }
}

/// Kalman fitter over a propagator.
pub struct KalmanFitter<S: Stepper> {
    propagator: Propagator<S>,
}

impl<S: Stepper> KalmanFitter<S> {
    pub fn new(propagator: Propagator<S>) -> Self {
        Self { propagator }
    }

    pub fn propagator(&self) -> &Propagator<S> {
        &self.propagator
    }

    /// Fit with the default navigator.
    pub fn fit(
        &self,
        source_links: &[SourceLink],
        start: &BoundTrackParameters,
        options: &KalmanFitterOptions<'_>,
    ) -> Result<KalmanFitterResult> {
        into_result(self.fit_raw(source_links, start, options, None))
    }

    /// Fit with the direct navigator along `sequence`.
    pub fn fit_direct(
        &self,
        source_links: &[SourceLink],
        start: &BoundTrackParameters,
        options: &KalmanFitterOptions<'_>,
        sequence: &[SurfaceRef],
    ) -> Result<KalmanFitterResult> {
        into_result(self.fit_raw(source_links, start, options, Some(sequence)))
    }

    /// Run the fit and hand back the result even on failure, with the error
    /// stored in [`KalmanFitterResult::result`].
    ///
    /// # Arguments
    /// * `sequence` - Surface sequence, required by the direct navigator and
    ///   rejected by the default one
    pub fn fit_raw(
        &self,
        source_links: &[SourceLink],
        start: &BoundTrackParameters,
        options: &KalmanFitterOptions<'_>,
        sequence: Option<&[SurfaceRef]>,
    ) -> KalmanFitterResult {
        let mut result = KalmanFitterResult::default();

        let direct = self.propagator.navigator().is_direct();
        match (direct, sequence.is_some()) {
            (true, false) => {
                result.result = Err(PropagatorError::NavigatorMismatch(
                    "direct navigator needs a surface sequence",
                )
                .into());
                return result;
            }
            (false, true) => {
                result.result = Err(PropagatorError::NavigatorMismatch(
                    "default navigator does not take a surface sequence",
                )
                .into());
                return result;
            }
            _ => {}
        }

        let input_measurements = MeasurementIndex::from_source_links(source_links);
        debug!(
            "Fitting {} measurements on {} surfaces",
            source_links.len(),
            input_measurements.len()
        );

        let actor = KalmanActor::new(&input_measurements, options, direct);
        let propagator_options = PropagatorOptions {
            geo_context: options.geo_context,
            mag_field_context: options.mag_field_context,
            plain: options.propagator_plain_options,
        };

        match self.propagator.propagate(
            start,
            &propagator_options,
            sequence.unwrap_or(&[]),
            &actor,
            &KalmanAborter,
            &mut result,
        ) {
            Ok(summary) => trace!(
                "Propagation took {} steps over {:.3} mm",
                summary.steps,
                summary.path_length
            ),
            Err(e) => {
                error!("Propagation failed: {}", e);
                if result.result.is_ok() {
                    result.result = Err(e.into());
                }
            }
        }

        if result.result.is_ok() && result.measurement_states == 0 {
            error!("No measurement detected during the propagation");
            result.result = Err(KalmanFitterError::NoMeasurementFound);
        }
        result
    }
}

fn into_result(result: KalmanFitterResult) -> Result<KalmanFitterResult> {
    if let Err(e) = &result.result {
        return Err(e.clone());
    }
    Ok(result)
}

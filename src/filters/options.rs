use super::extensions::KalmanFitterExtensions;
use crate::config::FitConfig;
use crate::geometry::SurfaceRef;
use crate::propagator::{FreeToBoundCorrection, PropagatorPlainOptions};
use crate::types::*;

/// Per-fit configuration of the Kalman fitter.
#[derive(Clone, Debug)]
pub struct KalmanFitterOptions<'a> {
    pub geo_context: &'a GeometryContext,
    pub mag_field_context: &'a MagneticFieldContext,
    pub calibration_context: &'a CalibrationContext,
    pub extensions: KalmanFitterExtensions<'a>,
    pub propagator_plain_options: PropagatorPlainOptions,
    /// Surface the fitted parameters are expressed on. Without one the fit
    /// ends right after smoothing or reversed filtering.
    pub reference_surface: Option<SurfaceRef>,
    pub multiple_scattering: bool,
    pub energy_loss: bool,
    /// Always run the reversed filter instead of the smoother
    pub reversed_filtering: bool,
    /// Covariance inflation at the reversal point
    pub reversed_filtering_covariance_scaling: f64,
    pub free_to_bound_correction: FreeToBoundCorrection,
}

impl<'a> KalmanFitterOptions<'a> {
    pub fn new(
        geo_context: &'a GeometryContext,
        mag_field_context: &'a MagneticFieldContext,
        calibration_context: &'a CalibrationContext,
        extensions: KalmanFitterExtensions<'a>,
        propagator_plain_options: PropagatorPlainOptions,
    ) -> Self {
        Self {
            geo_context,
            mag_field_context,
            calibration_context,
            extensions,
            propagator_plain_options,
            reference_surface: None,
            multiple_scattering: true,
            energy_loss: true,
            reversed_filtering: false,
            reversed_filtering_covariance_scaling: 1.0,
            free_to_bound_correction: FreeToBoundCorrection::default(),
        }
    }

    pub fn from_config(
        geo_context: &'a GeometryContext,
        mag_field_context: &'a MagneticFieldContext,
        calibration_context: &'a CalibrationContext,
        extensions: KalmanFitterExtensions<'a>,
        config: &FitConfig,
    ) -> Self {
        Self {
            multiple_scattering: config.multiple_scattering,
            energy_loss: config.energy_loss,
            reversed_filtering: config.reversed_filtering,
            reversed_filtering_covariance_scaling: config.reversed_filtering_covariance_scaling,
            free_to_bound_correction: config.free_to_bound_correction,
            ..Self::new(
                geo_context,
                mag_field_context,
                calibration_context,
                extensions,
                config.propagator,
            )
        }
    }

    pub fn with_reference_surface(mut self, surface: SurfaceRef) -> Self {
        self.reference_surface = Some(surface);
        self
    }

    pub fn with_reversed_filtering(mut self, covariance_scaling: f64) -> Self {
        self.reversed_filtering = true;
        self.reversed_filtering_covariance_scaling = covariance_scaling;
        self
    }

    pub fn with_material_effects(mut self, multiple_scattering: bool, energy_loss: bool) -> Self {
        self.multiple_scattering = multiple_scattering;
        self.energy_loss = energy_loss;
        self
    }
}

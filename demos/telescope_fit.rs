/// Example: fit a straight track through a five-plane silicon telescope
///
/// Usage:
///   cargo run --example telescope_fit [config.json]
///
/// The optional JSON file is a partial `FitConfig`, e.g.
///   {"reversed_filtering": true, "outlier_chi2_cut": 9.0}
///
/// Prints the fit summary as JSON and a line per track state.

use anyhow::{Context, Result};
use std::sync::Arc;
use track_fitter_rs::batch::{fit_parallel, FitJob};
use track_fitter_rs::event_data::{BoundTrackParameters, Measurement};
use track_fitter_rs::filters::*;
use track_fitter_rs::geometry::{Surface, TelescopeConfig, TrackingGeometry};
use track_fitter_rs::material::{Material, MaterialSlab, SurfaceMaterial};
use track_fitter_rs::propagator::{Navigator, Propagator, StraightLineStepper};
use track_fitter_rs::types::*;
use track_fitter_rs::units::{GEV, MM, UM};
use track_fitter_rs::FitConfig;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => FitConfig::from_path(&path).with_context(|| format!("loading {}", path))?,
        None => FitConfig::default(),
    };

    let geometry = Arc::new(TrackingGeometry::telescope(&TelescopeConfig {
        material: Some(SurfaceMaterial::homogeneous(MaterialSlab::new(
            Material::silicon(),
            0.15 * MM,
        ))),
        ..TelescopeConfig::default()
    }));
    log::info!("Telescope with {} planes", geometry.len());

    // Hits of a track with a small slope in loc0, 20 um resolution
    let resolution = 20.0 * UM;
    let wobble = [0.3, -0.5, 0.8, -0.2, 0.1];
    let measurements = geometry
        .surfaces()
        .iter()
        .enumerate()
        .map(|(index, surface)| {
            let x = surface.center(&GeometryContext).x;
            let loc0 = 1e-3 * x + wobble[index] * resolution;
            Measurement::diagonal(
                SourceLink::new(surface.geometry_id(), index),
                &[BOUND_LOC0, BOUND_LOC1],
                &[loc0, 0.0],
                &[resolution * resolution, resolution * resolution],
            )
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let calibrator = MeasurementCalibrator::new(measurements);

    let variances = BoundVector::from_column_slice(&[1.0, 1.0, 1e-4, 1e-4, 1e-4, 1.0]);
    let start = BoundTrackParameters::curvilinear(
        &GeometryContext,
        nalgebra::Vector3::zeros(),
        nalgebra::Vector3::x(),
        1.0 / (2.0 * GEV),
        0.0,
        Some(BoundMatrix::from_diagonal(&variances)),
    );

    let outlier_finder = config.outlier_finder();
    let reverse_logic = config.reverse_logic();
    let mut extensions = KalmanFitterExtensions::default()
        .with_calibrator(&calibrator)
        .with_updater(&GainMatrixUpdater)
        .with_smoother(&GainMatrixSmoother);
    if let Some(finder) = &outlier_finder {
        extensions = extensions.with_outlier_finder(finder);
    }
    if let Some(logic) = &reverse_logic {
        extensions = extensions.with_reverse_filtering_logic(logic);
    }
    let options = KalmanFitterOptions::from_config(
        &GeometryContext,
        &MagneticFieldContext,
        &CalibrationContext,
        extensions,
        &config,
    )
    .with_reference_surface(start.reference_surface().clone());

    let fitter = KalmanFitter::new(Propagator::new(StraightLineStepper, Navigator::Default(geometry)));
    let result = fitter.fit(&calibrator.source_links(), &start, &options)?;

    println!("{}", serde_json::to_string_pretty(&result.summary())?);
    for state in result.fitted_states.iter() {
        let estimate = state.smoothed.as_ref().or(state.filtered.as_ref());
        if let Some(estimate) = estimate {
            println!(
                "{:>22}  loc0 {:>9.4} mm  loc1 {:>9.4} mm  chi2 {:>6.2}",
                state.reference_surface().geometry_id().to_string(),
                estimate.parameters[BOUND_LOC0] / MM,
                estimate.parameters[BOUND_LOC1] / MM,
                state.chi2
            );
        }
    }

    // The same track fitted a few times over on worker threads
    let jobs: Vec<FitJob> = (0..4)
        .map(|_| FitJob::new(calibrator.source_links(), start.clone()))
        .collect();
    let batch = fit_parallel(&fitter, &jobs, &options, 2);
    let ok = batch.iter().filter(|r| r.is_ok()).count();
    log::info!("Batch: {}/{} fits succeeded", ok, batch.len());

    Ok(())
}

//! Kalman filter track fitting
//!
//! Charged-particle tracks are fitted by propagating start parameters through
//! a tracking geometry and running a Kalman filter on every surface with a
//! measurement. Afterwards the track is smoothed, or filtered a second time in
//! reverse, and optionally expressed on a reference surface.
//!
//! ```no_run
//! use std::sync::Arc;
//! use track_fitter_rs::filters::*;
//! use track_fitter_rs::geometry::{TelescopeConfig, TrackingGeometry};
//! use track_fitter_rs::propagator::{Navigator, Propagator, PropagatorPlainOptions, StraightLineStepper};
//! use track_fitter_rs::types::*;
//!
//! # fn run(calibrator: MeasurementCalibrator, start: track_fitter_rs::event_data::BoundTrackParameters) -> track_fitter_rs::error::Result<()> {
//! let geometry = Arc::new(TrackingGeometry::telescope(&TelescopeConfig::default()));
//! let fitter = KalmanFitter::new(Propagator::new(StraightLineStepper, Navigator::Default(geometry)));
//! let extensions = KalmanFitterExtensions::default()
//!     .with_calibrator(&calibrator)
//!     .with_updater(&GainMatrixUpdater)
//!     .with_smoother(&GainMatrixSmoother);
//! let options = KalmanFitterOptions::new(
//!     &GeometryContext,
//!     &MagneticFieldContext,
//!     &CalibrationContext,
//!     extensions,
//!     PropagatorPlainOptions::default(),
//! );
//! let result = fitter.fit(&calibrator.source_links(), &start, &options)?;
//! println!("{} measurements, chi2 {:.2}", result.measurement_states, result.chi2_sum());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod event_data;
pub mod filters;
pub mod geometry;
pub mod material;
pub mod measurement_selector;
pub mod propagator;
pub mod seeding;
pub mod types;
pub mod units;

pub use config::FitConfig;
pub use error::{KalmanFitterError, PropagatorError, Result};
pub use filters::{KalmanFitter, KalmanFitterOptions, KalmanFitterResult};

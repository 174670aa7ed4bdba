//! Kalman filter track fit
//!
//! The fitter itself is generic over its pluggable steps
//! ([`KalmanFitterExtensions`]); this module also carries the default
//! gain-matrix updater and smoother, a calibrator over an owned measurement
//! container, and simple outlier and reversal policies.

pub mod calibrator;
pub mod extensions;
pub mod gain_matrix;
pub mod kalman_fitter;
pub mod kalman_result;
pub mod options;
pub mod outlier_finder;
pub mod reverse_logic;
pub mod update_helpers;

pub use calibrator::MeasurementCalibrator;
pub use extensions::*;
pub use gain_matrix::{GainMatrixSmoother, GainMatrixUpdater};
pub use kalman_fitter::{KalmanAborter, KalmanActor, KalmanFitter};
pub use kalman_result::{FitSummary, KalmanFitterResult};
pub use options::KalmanFitterOptions;
pub use outlier_finder::Chi2OutlierFinder;
pub use reverse_logic::MomentumReverseLogic;

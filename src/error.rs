use thiserror::Error;

/// Errors raised while stepping through the geometry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagatorError {
    #[error("Propagation reached the step count limit of {0}")]
    StepCountLimitReached(usize),

    #[error("Navigator does not support this fit: {0}")]
    NavigatorMismatch(&'static str),

    #[error("Invalid step: {0}")]
    InvalidStep(String),
}

/// Track fit error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KalmanFitterError {
    #[error("No measurement detected during the propagation")]
    NoMeasurementFound,

    #[error("Reversing the navigation direction failed")]
    ReverseNavigationFailed,

    #[error("Kalman update on the backward pass failed")]
    BackwardUpdateFailed,

    #[error("Kalman smoothing failed")]
    SmoothFailed,

    #[error("Kalman update failed: {0}")]
    UpdateFailed(String),

    #[error("Calibration failed: {0}")]
    CalibrationFailed(String),

    #[error("Extension '{0}' was invoked but never configured")]
    ExtensionNotConfigured(&'static str),

    #[error("Measurement size {0} outside of [1, {}]", crate::types::MEASUREMENT_SIZE_MAX)]
    InvalidMeasurementSize(usize),

    #[error("Singular matrix: {0}")]
    SingularMatrix(&'static str),

    #[error("Propagation failed: {0}")]
    Propagation(#[from] PropagatorError),
}

/// Errors loading or validating a fit configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for fitter operations
pub type Result<T> = std::result::Result<T, KalmanFitterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            KalmanFitterError::NoMeasurementFound.to_string(),
            "No measurement detected during the propagation"
        );
        assert_eq!(
            KalmanFitterError::ExtensionNotConfigured("updater").to_string(),
            "Extension 'updater' was invoked but never configured"
        );
        assert_eq!(
            KalmanFitterError::InvalidMeasurementSize(7).to_string(),
            "Measurement size 7 outside of [1, 6]"
        );
    }

    #[test]
    fn test_propagation_error_conversion() {
        let err: KalmanFitterError = PropagatorError::StepCountLimitReached(100).into();
        assert_eq!(
            err,
            KalmanFitterError::Propagation(PropagatorError::StepCountLimitReached(100))
        );
        assert!(err.to_string().contains("step count limit of 100"));
    }
}

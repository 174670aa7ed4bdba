use crate::error::{KalmanFitterError, Result};
use crate::types::*;
use nalgebra::{Const, DMatrix, DVector, Dyn, OMatrix};

/// Leading `k` rows of a projector.
pub type EffectiveProjector = OMatrix<f64, Dyn, Const<BOUND_SIZE>>;

/// A measurement of a subspace of the bound parameters on one surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    source_link: SourceLink,
    indices: Vec<usize>,
    parameters: MeasurementVector,
    covariance: MeasurementCovariance,
}

impl Measurement {
    /// # Arguments
    /// * `indices` - Bound parameter indices measured, in measurement order
    /// * `values` - Measured values, one per index
    /// * `covariance` - Row-major `k×k` covariance
    pub fn new(
        source_link: SourceLink,
        indices: &[usize],
        values: &[f64],
        covariance: &[f64],
    ) -> Result<Self> {
        let size = indices.len();
        if size == 0 || size > MEASUREMENT_SIZE_MAX {
            return Err(KalmanFitterError::InvalidMeasurementSize(size));
        }
        if values.len() != size || covariance.len() != size * size {
            return Err(KalmanFitterError::CalibrationFailed(format!(
                "expected {} values and {} covariance entries, got {} and {}",
                size,
                size * size,
                values.len(),
                covariance.len()
            )));
        }
        for (i, index) in indices.iter().enumerate() {
            if *index >= BOUND_SIZE || indices[..i].contains(index) {
                return Err(KalmanFitterError::CalibrationFailed(format!(
                    "invalid bound index {} in measurement",
                    index
                )));
            }
        }

        let mut parameters = MeasurementVector::zeros();
        let mut cov = MeasurementCovariance::zeros();
        for row in 0..size {
            parameters[row] = values[row];
            for col in 0..size {
                cov[(row, col)] = covariance[row * size + col];
            }
        }

        Ok(Self {
            source_link,
            indices: indices.to_vec(),
            parameters,
            covariance: cov,
        })
    }

    /// Measurement with uncorrelated errors.
    pub fn diagonal(
        source_link: SourceLink,
        indices: &[usize],
        values: &[f64],
        variances: &[f64],
    ) -> Result<Self> {
        let size = variances.len();
        let mut covariance = vec![0.0; size * size];
        for (i, variance) in variances.iter().enumerate() {
            covariance[i * size + i] = *variance;
        }
        Self::new(source_link, indices, values, &covariance)
    }

    pub fn source_link(&self) -> &SourceLink {
        &self.source_link
    }

    pub fn size(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn projector(&self) -> Projector {
        let mut projector = Projector::zeros();
        for (row, index) in self.indices.iter().enumerate() {
            projector[(row, *index)] = 1.0;
        }
        projector
    }

    pub fn calibrate(&self) -> CalibratedMeasurement {
        CalibratedMeasurement {
            parameters: self.parameters,
            covariance: self.covariance,
            projector: self.projector(),
            size: self.size(),
        }
    }
}

/// Measurement as attached to a track state, zero-padded to the maximum size.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibratedMeasurement {
    pub parameters: MeasurementVector,
    pub covariance: MeasurementCovariance,
    pub projector: Projector,
    /// Effective dimension
    pub size: usize,
}

impl CalibratedMeasurement {
    pub fn effective_parameters(&self) -> DVector<f64> {
        self.parameters.rows(0, self.size).into_owned()
    }

    pub fn effective_covariance(&self) -> DMatrix<f64> {
        self.covariance
            .view((0, 0), (self.size, self.size))
            .into_owned()
    }

    pub fn effective_projector(&self) -> EffectiveProjector {
        self.projector.rows(0, self.size).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> SourceLink {
        SourceLink::new(GeometryId::new(1), 0)
    }

    #[test]
    fn test_projector_selects_indices() {
        let m = Measurement::diagonal(link(), &[BOUND_LOC1, BOUND_TIME], &[2.0, 5.0], &[0.1, 0.2])
            .unwrap();
        let h = m.projector();

        let mut bound = BoundVector::zeros();
        bound[BOUND_LOC1] = 2.0;
        bound[BOUND_TIME] = 5.0;
        let projected = h * bound;
        assert_eq!(projected[0], 2.0);
        assert_eq!(projected[1], 5.0);
        assert_eq!(projected.rows(2, 4).sum(), 0.0);
    }

    #[test]
    fn test_calibrated_effective_views() {
        let m = Measurement::new(
            link(),
            &[BOUND_LOC0, BOUND_LOC1],
            &[1.0, -1.0],
            &[0.5, 0.1, 0.1, 0.4],
        )
        .unwrap();
        let calibrated = m.calibrate();

        assert_eq!(calibrated.size, 2);
        assert_eq!(calibrated.effective_parameters().len(), 2);
        assert_eq!(calibrated.effective_covariance()[(1, 0)], 0.1);
        assert_eq!(calibrated.effective_projector().nrows(), 2);
        assert_eq!(calibrated.effective_projector()[(1, BOUND_LOC1)], 1.0);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(
            Measurement::diagonal(link(), &[], &[], &[]),
            Err(KalmanFitterError::InvalidMeasurementSize(0))
        ));
        assert!(matches!(
            Measurement::diagonal(link(), &[BOUND_LOC0], &[1.0, 2.0], &[1.0]),
            Err(KalmanFitterError::CalibrationFailed(_))
        ));
        assert!(matches!(
            Measurement::diagonal(link(), &[BOUND_LOC0, BOUND_LOC0], &[1.0, 2.0], &[1.0, 1.0]),
            Err(KalmanFitterError::CalibrationFailed(_))
        ));
    }
}

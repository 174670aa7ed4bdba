//! Linear algebra type system for the track fitter
//!
//! Fixed-size nalgebra aliases for bound (surface-local) and free (global)
//! track parameters, their jacobians, and measurement-space quantities.

use nalgebra::{SMatrix, SVector};

// ===== Parameter Dimensions =====
pub const BOUND_SIZE: usize = 6;
pub const FREE_SIZE: usize = 8;

/// Largest measurement dimension a calibrated measurement may carry.
pub const MEASUREMENT_SIZE_MAX: usize = BOUND_SIZE;

// ===== Bound Parameter Indices =====
pub const BOUND_LOC0: usize = 0;
pub const BOUND_LOC1: usize = 1;
pub const BOUND_PHI: usize = 2;
pub const BOUND_THETA: usize = 3;
pub const BOUND_QOP: usize = 4;
pub const BOUND_TIME: usize = 5;

// ===== Free Parameter Indices =====
pub const FREE_POS0: usize = 0;
pub const FREE_POS1: usize = 1;
pub const FREE_POS2: usize = 2;
pub const FREE_TIME: usize = 3;
pub const FREE_DIR0: usize = 4;
pub const FREE_DIR1: usize = 5;
pub const FREE_DIR2: usize = 6;
pub const FREE_QOP: usize = 7;

// ===== Bound Types =====
pub type BoundVector = SVector<f64, BOUND_SIZE>;
pub type BoundMatrix = SMatrix<f64, BOUND_SIZE, BOUND_SIZE>;

// ===== Free Types =====
pub type FreeVector = SVector<f64, FREE_SIZE>;
pub type FreeMatrix = SMatrix<f64, FREE_SIZE, FREE_SIZE>;

// Jacobian types
pub type BoundToFreeMatrix = SMatrix<f64, FREE_SIZE, BOUND_SIZE>; // 8×6
pub type FreeToBoundMatrix = SMatrix<f64, BOUND_SIZE, FREE_SIZE>; // 6×8
pub type FreeToPathMatrix = SMatrix<f64, 1, FREE_SIZE>; // 1×8

// ===== Measurement Types =====
pub type MeasurementVector = SVector<f64, MEASUREMENT_SIZE_MAX>;
pub type MeasurementCovariance = SMatrix<f64, MEASUREMENT_SIZE_MAX, MEASUREMENT_SIZE_MAX>;
pub type Projector = SMatrix<f64, MEASUREMENT_SIZE_MAX, BOUND_SIZE>;

//! Unit constants
//!
//! Internal units are millimetres, GeV and the elementary charge with c = 1,
//! so time is a length as well. Multiply a value by a constant to bring it into internal units, divide to
//! read it back out.

// ===== Length =====
pub const MM: f64 = 1.0;
pub const UM: f64 = 1e-3 * MM;
pub const CM: f64 = 10.0 * MM;
pub const M: f64 = 1e3 * MM;

// ===== Time =====
pub const NS: f64 = 299.792_458 * MM;

// ===== Energy / momentum / mass =====
pub const GEV: f64 = 1.0;
pub const MEV: f64 = 1e-3 * GEV;
pub const KEV: f64 = 1e-6 * GEV;
pub const EV: f64 = 1e-9 * GEV;

// ===== Charge =====
pub const E: f64 = 1.0;

// ===== Density =====
pub const G_PER_CM3: f64 = 1.0;

/// Charged pion mass.
pub const PION_MASS: f64 = 139.570_39 * MEV;
/// Electron mass.
pub const ELECTRON_MASS: f64 = 0.510_998_95 * MEV;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_conversions() {
        assert!((1.5 * M / CM - 150.0).abs() < 1e-12);
        assert!((2.0 * CM / MM - 20.0).abs() < 1e-12);
        assert_eq!(MM, 1.0);
    }

    #[test]
    fn test_energy_conversions() {
        assert!((PION_MASS / MEV - 139.57039).abs() < 1e-9);
        assert!((1.0 * GEV / MEV - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_is_light_travel_length() {
        assert!((1.0 * NS / CM - 29.979_245_8).abs() < 1e-9);
    }
}

pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Geometry identifier ───────────────────────────────────────────────────

const VOLUME_MASK: u64 = 0xff00_0000_0000_0000;
const BOUNDARY_MASK: u64 = 0x00ff_0000_0000_0000;
const LAYER_MASK: u64 = 0x0000_fff0_0000_0000;
const APPROACH_MASK: u64 = 0x0000_000f_f000_0000;
const SENSITIVE_MASK: u64 = 0x0000_0000_0fff_ffff;

/// Packed identifier of a geometry object, unique per surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeometryId(pub u64);

impl GeometryId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    fn get(&self, mask: u64) -> u64 {
        (self.0 & mask) >> mask.trailing_zeros()
    }

    fn set(mut self, mask: u64, id: u64) -> Self {
        self.0 = (self.0 & !mask) | ((id << mask.trailing_zeros()) & mask);
        self
    }

    pub fn volume(&self) -> u64 {
        self.get(VOLUME_MASK)
    }

    pub fn boundary(&self) -> u64 {
        self.get(BOUNDARY_MASK)
    }

    pub fn layer(&self) -> u64 {
        self.get(LAYER_MASK)
    }

    pub fn approach(&self) -> u64 {
        self.get(APPROACH_MASK)
    }

    pub fn sensitive(&self) -> u64 {
        self.get(SENSITIVE_MASK)
    }

    pub fn with_volume(self, id: u64) -> Self {
        self.set(VOLUME_MASK, id)
    }

    pub fn with_boundary(self, id: u64) -> Self {
        self.set(BOUNDARY_MASK, id)
    }

    pub fn with_layer(self, id: u64) -> Self {
        self.set(LAYER_MASK, id)
    }

    pub fn with_approach(self, id: u64) -> Self {
        self.set(APPROACH_MASK, id)
    }

    pub fn with_sensitive(self, id: u64) -> Self {
        self.set(SENSITIVE_MASK, id)
    }
}

impl fmt::Display for GeometryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vol={}", self.volume())?;
        for (name, value) in [
            ("bnd", self.boundary()),
            ("lay", self.layer()),
            ("apr", self.approach()),
            ("sen", self.sensitive()),
        ] {
            if value != 0 {
                write!(f, "|{}={}", name, value)?;
            }
        }
        Ok(())
    }
}

// ─── Source link ───────────────────────────────────────────────────────────

/// Handle to one uncalibrated measurement.
///
/// `index` points into whatever measurement container the calibrator owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub geometry_id: GeometryId,
    pub index: usize,
}

impl SourceLink {
    pub fn new(geometry_id: GeometryId, index: usize) -> Self {
        Self { geometry_id, index }
    }
}

// ─── Navigation direction ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationDirection {
    #[default]
    Forward,
    Backward,
}

impl NavigationDirection {
    /// +1 for forward, -1 for backward
    pub fn sign(&self) -> f64 {
        match self {
            NavigationDirection::Forward => 1.0,
            NavigationDirection::Backward => -1.0,
        }
    }

    pub fn invert(&self) -> Self {
        match self {
            NavigationDirection::Forward => NavigationDirection::Backward,
            NavigationDirection::Backward => NavigationDirection::Forward,
        }
    }

    /// Direction matching the sign of a signed length.
    pub fn from_sign(value: f64) -> Self {
        if value < 0.0 {
            NavigationDirection::Backward
        } else {
            NavigationDirection::Forward
        }
    }
}

impl fmt::Display for NavigationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationDirection::Forward => write!(f, "forward"),
            NavigationDirection::Backward => write!(f, "backward"),
        }
    }
}

// ─── Contexts ──────────────────────────────────────────────────────────────

/// Alignment conditions for one event. Surfaces here are static.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeometryContext;

/// Magnetic field conditions for one event.
#[derive(Clone, Copy, Debug, Default)]
pub struct MagneticFieldContext;

/// Calibration conditions for one event.
#[derive(Clone, Copy, Debug, Default)]
pub struct CalibrationContext;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_id_fields_round_trip() {
        let id = GeometryId::default()
            .with_volume(3)
            .with_layer(14)
            .with_sensitive(512);

        assert_eq!(id.volume(), 3);
        assert_eq!(id.layer(), 14);
        assert_eq!(id.sensitive(), 512);
        assert_eq!(id.boundary(), 0);
        assert_eq!(id.approach(), 0);
    }

    #[test]
    fn test_geometry_id_overwrite_field() {
        let id = GeometryId::default().with_layer(4).with_layer(6);
        assert_eq!(id.layer(), 6);
    }

    #[test]
    fn test_geometry_id_display() {
        let id = GeometryId::default().with_volume(1).with_layer(2).with_sensitive(7);
        assert_eq!(id.to_string(), "vol=1|lay=2|sen=7");
    }

    #[test]
    fn test_geometry_id_ordering_by_volume_first() {
        let a = GeometryId::default().with_volume(1).with_layer(9);
        let b = GeometryId::default().with_volume(2).with_layer(1);
        assert!(a < b);
    }

    #[test]
    fn test_navigation_direction() {
        let dir = NavigationDirection::Forward;
        assert_eq!(dir.sign(), 1.0);
        assert_eq!(dir.invert(), NavigationDirection::Backward);
        assert_eq!(dir.invert().invert(), dir);
        assert_eq!(NavigationDirection::from_sign(-0.5), NavigationDirection::Backward);
    }
}

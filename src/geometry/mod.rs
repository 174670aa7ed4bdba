pub mod surface;
pub mod tracking_geometry;

pub use surface::*;
pub use tracking_geometry::*;

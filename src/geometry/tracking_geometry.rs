use super::surface::*;
use crate::material::SurfaceMaterial;
use crate::types::GeometryId;
use crate::units::MM;
use nalgebra::Vector3;

/// Immutable collection of the surfaces a navigator may report.
#[derive(Clone, Debug, Default)]
pub struct TrackingGeometry {
    surfaces: Vec<SurfaceRef>,
}

impl TrackingGeometry {
    pub fn new(surfaces: Vec<SurfaceRef>) -> Self {
        Self { surfaces }
    }

    pub fn surfaces(&self) -> &[SurfaceRef] {
        &self.surfaces
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn find_surface(&self, geometry_id: GeometryId) -> Option<&SurfaceRef> {
        self.surfaces
            .iter()
            .find(|surface| surface.geometry_id() == geometry_id)
    }

    /// Parallel sensitive planes perpendicular to the global x axis.
    pub fn telescope(config: &TelescopeConfig) -> Self {
        let surfaces = config
            .positions
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let layer = 2 * (i as u64 + 1);
                let geometry_id = GeometryId::default()
                    .with_volume(config.volume)
                    .with_layer(layer)
                    .with_sensitive(1);
                let mut plane = PlaneSurface::new(Vector3::new(x, 0.0, 0.0), Vector3::x())
                    .with_geometry_id(geometry_id)
                    .with_bounds(RectangleBounds::new(config.half_size, config.half_size))
                    .with_detector_element(DetectorElement::new(
                        geometry_id.value(),
                        config.thickness,
                    ));
                if let Some(material) = config.material {
                    plane = plane.with_material(material);
                }
                plane.into_shared()
            })
            .collect();

        Self { surfaces }
    }
}

/// Layout of a telescope made of identical square planes.
#[derive(Clone, Debug)]
pub struct TelescopeConfig {
    /// Plane positions along global x (mm)
    pub positions: Vec<f64>,
    /// Half side length of each plane (mm)
    pub half_size: f64,
    /// Sensor thickness (mm)
    pub thickness: f64,
    pub volume: u64,
    pub material: Option<SurfaceMaterial>,
}

impl Default for TelescopeConfig {
    fn default() -> Self {
        Self {
            positions: vec![100.0 * MM, 200.0 * MM, 300.0 * MM, 400.0 * MM, 500.0 * MM],
            half_size: 100.0 * MM,
            thickness: 0.15 * MM,
            volume: 1,
            material: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeometryContext;

    #[test]
    fn test_telescope_layers() {
        let geometry = TrackingGeometry::telescope(&TelescopeConfig::default());
        assert_eq!(geometry.len(), 5);

        let layers: Vec<u64> = geometry
            .surfaces()
            .iter()
            .map(|s| s.geometry_id().layer())
            .collect();
        assert_eq!(layers, vec![2, 4, 6, 8, 10]);
        assert!(geometry
            .surfaces()
            .iter()
            .all(|s| s.associated_detector_element().is_some() && s.surface_material().is_none()));
    }

    #[test]
    fn test_find_surface() {
        let geometry = TrackingGeometry::telescope(&TelescopeConfig::default());
        let id = geometry.surfaces()[2].geometry_id();
        let found = geometry.find_surface(id).map(|s| s.center(&GeometryContext).x);
        assert_eq!(found, Some(300.0));
        assert!(geometry.find_surface(GeometryId::new(42)).is_none());
    }
}

//! Surface contract and the planar surface used by the fitter
//!
//! Every surface exposes a local frame (rotation columns: local x, local y,
//! normal). Intersections and the bound/free jacobians are planar algorithms
//! expressed in that frame.

use crate::material::SurfaceMaterial;
use crate::types::*;
use crate::units::MM;
use nalgebra::{Matrix3, Vector2, Vector3};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a surface.
pub type SurfaceRef = Arc<dyn Surface>;

/// Tolerance below which a point counts as lying on a surface.
pub const ON_SURFACE_TOLERANCE: f64 = 1e-4 * MM;

/// Identity comparison of two shared surfaces.
pub fn same_surface(a: &SurfaceRef, b: &SurfaceRef) -> bool {
    Arc::ptr_eq(a, b)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntersectionStatus {
    Missed,
    Reachable,
    OnSurface,
}

/// Straight-line intersection with a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intersection {
    pub position: Vector3<f64>,
    /// Signed distance along the given direction
    pub path_length: f64,
    pub status: IntersectionStatus,
}

impl Intersection {
    pub fn missed() -> Self {
        Self {
            position: Vector3::zeros(),
            path_length: f64::INFINITY,
            status: IntersectionStatus::Missed,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status != IntersectionStatus::Missed
    }
}

/// Sensitive element read out on a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorElement {
    pub identifier: u64,
    pub thickness: f64,
}

impl DetectorElement {
    pub fn new(identifier: u64, thickness: f64) -> Self {
        Self {
            identifier,
            thickness,
        }
    }
}

/// Geometry contract required by the fitter.
pub trait Surface: fmt::Debug + Send + Sync {
    fn geometry_id(&self) -> GeometryId;

    fn center(&self, gctx: &GeometryContext) -> Vector3<f64>;

    /// Columns are local x, local y and the surface normal.
    fn rotation(&self, gctx: &GeometryContext) -> Matrix3<f64>;

    fn inside_bounds(&self, local: &Vector2<f64>) -> bool;

    fn associated_detector_element(&self) -> Option<&DetectorElement>;

    fn surface_material(&self) -> Option<&SurfaceMaterial>;

    fn normal(&self, gctx: &GeometryContext) -> Vector3<f64> {
        self.rotation(gctx).column(2).into_owned()
    }

    fn local_to_global(&self, gctx: &GeometryContext, local: &Vector2<f64>) -> Vector3<f64> {
        self.center(gctx) + self.rotation(gctx) * Vector3::new(local.x, local.y, 0.0)
    }

    fn global_to_local(&self, gctx: &GeometryContext, position: &Vector3<f64>) -> Vector2<f64> {
        let local = self.rotation(gctx).transpose() * (position - self.center(gctx));
        Vector2::new(local.x, local.y)
    }

    fn intersect(
        &self,
        gctx: &GeometryContext,
        position: &Vector3<f64>,
        direction: &Vector3<f64>,
        bound_check: bool,
    ) -> Intersection {
        let normal = self.normal(gctx);
        let cos_alpha = normal.dot(direction);
        if cos_alpha.abs() < f64::EPSILON {
            return Intersection::missed();
        }
        let path_length = normal.dot(&(self.center(gctx) - position)) / cos_alpha;
        let point = position + path_length * direction;

        let mut status = if path_length.abs() < ON_SURFACE_TOLERANCE {
            IntersectionStatus::OnSurface
        } else {
            IntersectionStatus::Reachable
        };
        if bound_check && !self.inside_bounds(&self.global_to_local(gctx, &point)) {
            status = IntersectionStatus::Missed;
        }

        Intersection {
            position: point,
            path_length,
            status,
        }
    }

    /// Factor converting the normal thickness into the crossed thickness.
    fn path_correction(&self, gctx: &GeometryContext, direction: &Vector3<f64>) -> f64 {
        let cos_alpha = self.normal(gctx).dot(direction).abs();
        if cos_alpha > f64::EPSILON {
            1.0 / cos_alpha
        } else {
            f64::INFINITY
        }
    }

    fn bound_to_free_jacobian(&self, gctx: &GeometryContext, bound: &BoundVector) -> BoundToFreeMatrix {
        let rotation = self.rotation(gctx);
        let (sin_phi, cos_phi) = bound[BOUND_PHI].sin_cos();
        let (sin_theta, cos_theta) = bound[BOUND_THETA].sin_cos();

        let mut jac = BoundToFreeMatrix::zeros();
        jac.fixed_view_mut::<3, 1>(FREE_POS0, BOUND_LOC0)
            .copy_from(&rotation.column(0));
        jac.fixed_view_mut::<3, 1>(FREE_POS0, BOUND_LOC1)
            .copy_from(&rotation.column(1));
        jac[(FREE_TIME, BOUND_TIME)] = 1.0;
        jac[(FREE_DIR0, BOUND_PHI)] = -sin_theta * sin_phi;
        jac[(FREE_DIR1, BOUND_PHI)] = sin_theta * cos_phi;
        jac[(FREE_DIR0, BOUND_THETA)] = cos_theta * cos_phi;
        jac[(FREE_DIR1, BOUND_THETA)] = cos_theta * sin_phi;
        jac[(FREE_DIR2, BOUND_THETA)] = -sin_theta;
        jac[(FREE_QOP, BOUND_QOP)] = 1.0;
        jac
    }

    fn free_to_bound_jacobian(&self, gctx: &GeometryContext, free: &FreeVector) -> FreeToBoundMatrix {
        let rotation_t = self.rotation(gctx).transpose();
        let direction = free.fixed_rows::<3>(FREE_DIR0).normalize();
        let cos_theta = direction.z;
        let sin_theta = direction.x.hypot(direction.y).max(f64::EPSILON);
        let inv_sin_theta = 1.0 / sin_theta;
        let cos_phi = direction.x * inv_sin_theta;
        let sin_phi = direction.y * inv_sin_theta;

        let mut jac = FreeToBoundMatrix::zeros();
        jac.fixed_view_mut::<1, 3>(BOUND_LOC0, FREE_POS0)
            .copy_from(&rotation_t.row(0));
        jac.fixed_view_mut::<1, 3>(BOUND_LOC1, FREE_POS0)
            .copy_from(&rotation_t.row(1));
        jac[(BOUND_TIME, FREE_TIME)] = 1.0;
        jac[(BOUND_PHI, FREE_DIR0)] = -sin_phi * inv_sin_theta;
        jac[(BOUND_PHI, FREE_DIR1)] = cos_phi * inv_sin_theta;
        jac[(BOUND_THETA, FREE_DIR0)] = cos_phi * cos_theta;
        jac[(BOUND_THETA, FREE_DIR1)] = sin_phi * cos_theta;
        jac[(BOUND_THETA, FREE_DIR2)] = -sin_theta;
        jac[(BOUND_QOP, FREE_QOP)] = 1.0;
        jac
    }

    /// Derivative of the path length to the surface w.r.t. free parameters.
    fn free_to_path_derivative(&self, gctx: &GeometryContext, free: &FreeVector) -> FreeToPathMatrix {
        let normal = self.normal(gctx);
        let direction = free.fixed_rows::<3>(FREE_DIR0).normalize();
        let cos_alpha = normal.dot(&direction);

        let mut derivative = FreeToPathMatrix::zeros();
        derivative
            .fixed_view_mut::<1, 3>(0, FREE_POS0)
            .copy_from(&(-normal.transpose() / cos_alpha));
        derivative
    }
}

/// Local rectangle `|x| ≤ half_x`, `|y| ≤ half_y`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectangleBounds {
    pub half_x: f64,
    pub half_y: f64,
}

impl RectangleBounds {
    pub fn new(half_x: f64, half_y: f64) -> Self {
        Self { half_x, half_y }
    }

    pub fn inside(&self, local: &Vector2<f64>) -> bool {
        local.x.abs() <= self.half_x && local.y.abs() <= self.half_y
    }
}

#[derive(Clone, Debug)]
pub struct PlaneSurface {
    geometry_id: GeometryId,
    center: Vector3<f64>,
    rotation: Matrix3<f64>,
    bounds: Option<RectangleBounds>,
    detector_element: Option<DetectorElement>,
    material: Option<SurfaceMaterial>,
}

impl PlaneSurface {
    /// Unbounded plane through `center` with the curvilinear frame of `normal`.
    pub fn new(center: Vector3<f64>, normal: Vector3<f64>) -> Self {
        Self::from_rotation(center, curvilinear_frame(&normal))
    }

    pub fn from_rotation(center: Vector3<f64>, rotation: Matrix3<f64>) -> Self {
        Self {
            geometry_id: GeometryId::default(),
            center,
            rotation,
            bounds: None,
            detector_element: None,
            material: None,
        }
    }

    /// Plane through `position` perpendicular to `direction`.
    pub fn curvilinear(position: Vector3<f64>, direction: Vector3<f64>) -> Self {
        Self::new(position, direction)
    }

    pub fn with_geometry_id(mut self, geometry_id: GeometryId) -> Self {
        self.geometry_id = geometry_id;
        self
    }

    pub fn with_bounds(mut self, bounds: RectangleBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_detector_element(mut self, element: DetectorElement) -> Self {
        self.detector_element = Some(element);
        self
    }

    pub fn with_material(mut self, material: SurfaceMaterial) -> Self {
        self.material = Some(material);
        self
    }

    pub fn bounds(&self) -> Option<&RectangleBounds> {
        self.bounds.as_ref()
    }

    pub fn into_shared(self) -> SurfaceRef {
        Arc::new(self)
    }
}

impl Surface for PlaneSurface {
    fn geometry_id(&self) -> GeometryId {
        self.geometry_id
    }

    fn center(&self, _gctx: &GeometryContext) -> Vector3<f64> {
        self.center
    }

    fn rotation(&self, _gctx: &GeometryContext) -> Matrix3<f64> {
        self.rotation
    }

    fn inside_bounds(&self, local: &Vector2<f64>) -> bool {
        self.bounds.map_or(true, |bounds| bounds.inside(local))
    }

    fn associated_detector_element(&self) -> Option<&DetectorElement> {
        self.detector_element.as_ref()
    }

    fn surface_material(&self) -> Option<&SurfaceMaterial> {
        self.material.as_ref()
    }
}

/// Right-handed frame whose third axis is `direction`.
pub fn curvilinear_frame(direction: &Vector3<f64>) -> Matrix3<f64> {
    let t = direction.normalize();
    let u = if t.z.abs() < 0.999_99 {
        Vector3::z().cross(&t).normalize()
    } else {
        Vector3::x().cross(&t).normalize()
    };
    let v = t.cross(&u);
    Matrix3::from_columns(&[u, v, t])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_at_x(x: f64) -> PlaneSurface {
        PlaneSurface::new(Vector3::new(x, 0.0, 0.0), Vector3::x())
    }

    #[test]
    fn test_curvilinear_frame_is_orthonormal() {
        let frame = curvilinear_frame(&Vector3::new(1.0, 2.0, 0.5));
        assert_relative_eq!(frame.transpose() * frame, Matrix3::identity(), epsilon = 1e-12);
        assert!((frame.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_plane_frame_along_x() {
        let frame = curvilinear_frame(&Vector3::x());
        assert_relative_eq!(frame.column(0).into_owned(), Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(frame.column(1).into_owned(), Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_intersect_forward_and_backward() {
        let gctx = GeometryContext;
        let plane = plane_at_x(100.0);
        let origin = Vector3::new(0.0, 1.0, 2.0);

        let ahead = plane.intersect(&gctx, &origin, &Vector3::x(), false);
        assert_eq!(ahead.status, IntersectionStatus::Reachable);
        assert!((ahead.path_length - 100.0).abs() < 1e-12);
        assert_relative_eq!(ahead.position, Vector3::new(100.0, 1.0, 2.0), epsilon = 1e-12);

        let behind = plane.intersect(&gctx, &origin, &(-Vector3::x()), false);
        assert!((behind.path_length + 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_intersect_parallel_misses() {
        let gctx = GeometryContext;
        let plane = plane_at_x(100.0);
        let intersection = plane.intersect(&gctx, &Vector3::zeros(), &Vector3::y(), false);
        assert!(!intersection.is_valid());
    }

    #[test]
    fn test_bound_check() {
        let gctx = GeometryContext;
        let plane = plane_at_x(50.0).with_bounds(RectangleBounds::new(10.0, 10.0));
        let outside = Vector3::new(0.0, 20.0, 0.0);

        let checked = plane.intersect(&gctx, &outside, &Vector3::x(), true);
        assert_eq!(checked.status, IntersectionStatus::Missed);
        let unchecked = plane.intersect(&gctx, &outside, &Vector3::x(), false);
        assert_eq!(unchecked.status, IntersectionStatus::Reachable);
    }

    #[test]
    fn test_local_global_round_trip() {
        let gctx = GeometryContext;
        let plane = PlaneSurface::new(Vector3::new(5.0, -3.0, 2.0), Vector3::new(1.0, 1.0, 0.0));
        let local = Vector2::new(1.5, -0.25);
        let global = plane.local_to_global(&gctx, &local);
        assert_relative_eq!(plane.global_to_local(&gctx, &global), local, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobians_invert_each_other_on_the_surface() {
        let gctx = GeometryContext;
        let plane = plane_at_x(0.0);
        let mut bound = BoundVector::zeros();
        bound[BOUND_PHI] = 0.1;
        bound[BOUND_THETA] = 1.4;
        bound[BOUND_QOP] = 0.5;

        let (sin_phi, cos_phi) = bound[BOUND_PHI].sin_cos();
        let (sin_theta, cos_theta) = bound[BOUND_THETA].sin_cos();
        let mut free = FreeVector::zeros();
        free[FREE_DIR0] = cos_phi * sin_theta;
        free[FREE_DIR1] = sin_phi * sin_theta;
        free[FREE_DIR2] = cos_theta;
        free[FREE_QOP] = 0.5;

        let to_free = plane.bound_to_free_jacobian(&gctx, &bound);
        let to_bound = plane.free_to_bound_jacobian(&gctx, &free);
        assert_relative_eq!(to_bound * to_free, BoundMatrix::identity(), epsilon = 1e-10);
    }

    #[test]
    fn test_path_correction() {
        let gctx = GeometryContext;
        let plane = plane_at_x(0.0);
        let tilted = Vector3::new(1.0, 1.0, 0.0).normalize();
        assert!((plane.path_correction(&gctx, &tilted) - 2.0_f64.sqrt()).abs() < 1e-12);
    }
}

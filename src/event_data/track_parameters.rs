use crate::geometry::{PlaneSurface, Surface, SurfaceRef};
use crate::types::*;
use nalgebra::{Vector2, Vector3};
use std::f64::consts::PI;

/// Unit direction from spherical angles.
pub fn make_direction(phi: f64, theta: f64) -> Vector3<f64> {
    let (sin_phi, cos_phi) = phi.sin_cos();
    let (sin_theta, cos_theta) = theta.sin_cos();
    Vector3::new(cos_phi * sin_theta, sin_phi * sin_theta, cos_theta)
}

/// Wrap an angle into [-π, π).
pub fn wrap_phi(phi: f64) -> f64 {
    (phi + PI).rem_euclid(2.0 * PI) - PI
}

pub fn free_position(free: &FreeVector) -> Vector3<f64> {
    free.fixed_rows::<3>(FREE_POS0).into_owned()
}

pub fn free_direction(free: &FreeVector) -> Vector3<f64> {
    free.fixed_rows::<3>(FREE_DIR0).normalize()
}

pub fn transform_bound_to_free(
    gctx: &GeometryContext,
    surface: &dyn Surface,
    bound: &BoundVector,
) -> FreeVector {
    let position = surface.local_to_global(gctx, &Vector2::new(bound[BOUND_LOC0], bound[BOUND_LOC1]));
    let direction = make_direction(bound[BOUND_PHI], bound[BOUND_THETA]);

    let mut free = FreeVector::zeros();
    free.fixed_rows_mut::<3>(FREE_POS0).copy_from(&position);
    free[FREE_TIME] = bound[BOUND_TIME];
    free.fixed_rows_mut::<3>(FREE_DIR0).copy_from(&direction);
    free[FREE_QOP] = bound[BOUND_QOP];
    free
}

/// Express free parameters on a surface. The position is assumed to lie on it.
pub fn transform_free_to_bound(
    gctx: &GeometryContext,
    surface: &dyn Surface,
    free: &FreeVector,
) -> BoundVector {
    let local = surface.global_to_local(gctx, &free_position(free));
    let direction = free_direction(free);

    let mut bound = BoundVector::zeros();
    bound[BOUND_LOC0] = local.x;
    bound[BOUND_LOC1] = local.y;
    bound[BOUND_PHI] = direction.y.atan2(direction.x);
    bound[BOUND_THETA] = direction.z.clamp(-1.0, 1.0).acos();
    bound[BOUND_QOP] = free[FREE_QOP];
    bound[BOUND_TIME] = free[FREE_TIME];
    bound
}

/// Track parameters expressed on a reference surface.
#[derive(Clone, Debug)]
pub struct BoundTrackParameters {
    surface: SurfaceRef,
    parameters: BoundVector,
    covariance: Option<BoundMatrix>,
}

impl BoundTrackParameters {
    pub fn new(surface: SurfaceRef, parameters: BoundVector, covariance: Option<BoundMatrix>) -> Self {
        Self {
            surface,
            parameters,
            covariance,
        }
    }

    /// Parameters on a plane through `position` perpendicular to `direction`.
    pub fn curvilinear(
        gctx: &GeometryContext,
        position: Vector3<f64>,
        direction: Vector3<f64>,
        qop: f64,
        time: f64,
        covariance: Option<BoundMatrix>,
    ) -> Self {
        let surface = PlaneSurface::curvilinear(position, direction).into_shared();
        let mut free = FreeVector::zeros();
        free.fixed_rows_mut::<3>(FREE_POS0).copy_from(&position);
        free[FREE_TIME] = time;
        free.fixed_rows_mut::<3>(FREE_DIR0).copy_from(&direction.normalize());
        free[FREE_QOP] = qop;
        let parameters = transform_free_to_bound(gctx, surface.as_ref(), &free);
        Self::new(surface, parameters, covariance)
    }

    pub fn reference_surface(&self) -> &SurfaceRef {
        &self.surface
    }

    pub fn parameters(&self) -> &BoundVector {
        &self.parameters
    }

    pub fn covariance(&self) -> Option<&BoundMatrix> {
        self.covariance.as_ref()
    }

    pub fn position(&self, gctx: &GeometryContext) -> Vector3<f64> {
        free_position(&self.free_parameters(gctx))
    }

    pub fn direction(&self) -> Vector3<f64> {
        make_direction(self.parameters[BOUND_PHI], self.parameters[BOUND_THETA])
    }

    pub fn qop(&self) -> f64 {
        self.parameters[BOUND_QOP]
    }

    pub fn charge(&self) -> f64 {
        if self.qop() < 0.0 {
            -1.0
        } else {
            1.0
        }
    }

    pub fn absolute_momentum(&self) -> f64 {
        self.charge() / self.qop()
    }

    pub fn time(&self) -> f64 {
        self.parameters[BOUND_TIME]
    }

    pub fn free_parameters(&self, gctx: &GeometryContext) -> FreeVector {
        transform_bound_to_free(gctx, self.surface.as_ref(), &self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_wrap_phi() {
        assert!((wrap_phi(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_phi(PI + 0.1) - (-PI + 0.1)).abs() < 1e-12);
        assert!((wrap_phi(-PI - 0.1) - (PI - 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_bound_free_round_trip() {
        let gctx = GeometryContext;
        let surface = PlaneSurface::new(Vector3::new(10.0, 0.0, 0.0), Vector3::x()).into_shared();
        let bound = BoundVector::from_column_slice(&[1.5, -2.0, 0.2, 1.3, -0.25, 4.0]);

        let free = transform_bound_to_free(&gctx, surface.as_ref(), &bound);
        assert!((free[FREE_POS0] - 10.0).abs() < 1e-12);
        let back = transform_free_to_bound(&gctx, surface.as_ref(), &free);
        assert_relative_eq!(back, bound, epsilon = 1e-12);
    }

    #[test]
    fn test_curvilinear_parameters() {
        let gctx = GeometryContext;
        let params = BoundTrackParameters::curvilinear(
            &gctx,
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, 1.0, 0.0),
            -0.5,
            7.0,
            None,
        );

        assert!(params.parameters()[BOUND_LOC0].abs() < 1e-12);
        assert!(params.parameters()[BOUND_LOC1].abs() < 1e-12);
        assert_relative_eq!(params.position(&gctx), Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert_relative_eq!(params.direction(), Vector3::y(), epsilon = 1e-12);
        assert_eq!(params.charge(), -1.0);
        assert!((params.absolute_momentum() - 2.0).abs() < 1e-12);
        assert!(params.covariance().is_none());
    }
}

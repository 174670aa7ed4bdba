//! Multiple scattering and ionisation energy loss
//!
//! Formulas follow the Review of Particle Physics: the Highland form of the
//! scattering angle and the Bethe mean energy loss without density effect,
//! with a Landau width for the q/p variance.

use super::{MaterialSlab, MaterialUpdateStage};
use crate::geometry::{Surface, SurfaceRef};
use crate::propagator::{Stepper, StepperState};
use crate::types::*;
use crate::units::{CM, ELECTRON_MASS, MEV};
use log::warn;
use nalgebra::Vector3;

/// Bethe prefactor 4π N_A r_e² m_e c² (MeV cm²/mol)
const BETHE_K: f64 = 0.307_075 * MEV;

/// Relativistic kinematics from mass, q/p and charge.
#[derive(Clone, Copy, Debug)]
struct Kinematics {
    momentum: f64,
    energy: f64,
    beta2: f64,
    beta_gamma2: f64,
    q2: f64,
}

impl Kinematics {
    fn new(mass: f64, qop: f64, q: f64) -> Self {
        let momentum = (q / qop).abs();
        let energy = momentum.hypot(mass);
        let beta_gamma2 = if mass > 0.0 {
            (momentum / mass).powi(2)
        } else {
            f64::INFINITY
        };
        Self {
            momentum,
            energy,
            beta2: (momentum / energy).powi(2),
            beta_gamma2,
            q2: q * q,
        }
    }

    /// Bethe scale ξ = K/2 · q² · Z/A · ρ · x / β²
    fn epsilon(&self, slab: &MaterialSlab) -> f64 {
        let material = &slab.material;
        0.5 * BETHE_K * self.q2 * (material.z / material.ar) * material.mass_density
            * (slab.thickness / CM)
            / self.beta2
    }
}

/// Width of the central scattering angle distribution (Highland).
pub fn compute_multiple_scattering_theta0(slab: &MaterialSlab, mass: f64, qop: f64, q: f64) -> f64 {
    if !slab.is_valid() || qop == 0.0 {
        return 0.0;
    }
    let kin = Kinematics::new(mass, qop, q);
    let t = (slab.thickness_in_x0() * kin.q2 / kin.beta2).sqrt();
    let highland = (1.0 + 0.038 * 2.0 * t.ln()).max(0.0);
    13.6 * MEV / kin.momentum * t * highland
}

/// Mean ionisation energy loss in the slab.
pub fn compute_energy_loss_mean(slab: &MaterialSlab, mass: f64, qop: f64, q: f64) -> f64 {
    if !slab.is_valid() || qop == 0.0 || mass <= 0.0 {
        return 0.0;
    }
    let kin = Kinematics::new(mass, qop, q);
    let argument = 2.0 * ELECTRON_MASS * kin.beta_gamma2 / slab.material.mean_excitation_energy();
    if argument <= 1.0 {
        return 0.0;
    }
    (2.0 * kin.epsilon(slab) * (argument.ln() - kin.beta2)).max(0.0)
}

/// Landau width of the energy loss, expressed as a Gaussian sigma.
pub fn compute_energy_loss_landau_sigma(slab: &MaterialSlab, mass: f64, qop: f64, q: f64) -> f64 {
    if !slab.is_valid() || qop == 0.0 {
        return 0.0;
    }
    let kin = Kinematics::new(mass, qop, q);
    // FWHM ≈ 4ξ, sigma = FWHM / (2 sqrt(2 ln 2))
    4.0 * kin.epsilon(slab) / 2.354_820_045
}

/// Landau width propagated to q/p.
pub fn compute_energy_loss_landau_sigma_qop(slab: &MaterialSlab, mass: f64, qop: f64, q: f64) -> f64 {
    if !slab.is_valid() || qop == 0.0 {
        return 0.0;
    }
    let kin = Kinematics::new(mass, qop, q);
    let sigma_e = compute_energy_loss_landau_sigma(slab, mass, qop, q);
    q.abs() * kin.energy / kin.momentum.powi(3) * sigma_e
}

/// Material effects on one surface for the current stepper state.
#[derive(Clone, Debug)]
pub struct PointwiseMaterialInteraction<'a> {
    pub surface: &'a dyn Surface,
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
    pub momentum: f64,
    pub q: f64,
    pub qop: f64,
    pub mass: f64,
    pub nav_dir: NavigationDirection,
    pub slab: MaterialSlab,
    pub path_correction: f64,
    pub variance_theta: f64,
    pub variance_phi: f64,
    pub variance_qop: f64,
    pub e_loss: f64,
}

impl<'a> PointwiseMaterialInteraction<'a> {
    pub fn new<S: Stepper>(surface: &'a SurfaceRef, stepping: &StepperState, stepper: &S) -> Self {
        Self {
            surface: surface.as_ref(),
            position: stepper.position(stepping),
            direction: stepper.direction(stepping),
            momentum: stepper.momentum(stepping),
            q: stepper.charge(stepping),
            qop: stepper.qop(stepping),
            mass: stepping.mass,
            nav_dir: stepping.nav_dir,
            slab: MaterialSlab::new(super::Material::new(0.0, 0.0, 0.0, 0.0, 0.0), 0.0),
            path_correction: 1.0,
            variance_theta: 0.0,
            variance_phi: 0.0,
            variance_qop: 0.0,
            e_loss: 0.0,
        }
    }

    /// Pick up the share of the surface material for `stage`, corrected for
    /// the incidence angle. Returns whether there is anything to apply.
    pub fn evaluate_material_slab(&mut self, gctx: &GeometryContext, stage: MaterialUpdateStage) -> bool {
        let Some(material) = self.surface.surface_material() else {
            return false;
        };
        self.slab = material.material_slab(self.nav_dir, stage);
        self.path_correction = self.surface.path_correction(gctx, &self.direction);
        if !self.path_correction.is_finite() {
            return false;
        }
        self.slab.scale_thickness(self.path_correction);
        self.slab.is_valid()
    }

    pub fn evaluate(&mut self, multiple_scattering: bool, energy_loss: bool) {
        if multiple_scattering {
            let theta0 = compute_multiple_scattering_theta0(&self.slab, self.mass, self.qop, self.q);
            let sin_theta = self.direction.x.hypot(self.direction.y).max(f64::EPSILON);
            self.variance_theta = theta0 * theta0;
            self.variance_phi = self.variance_theta / (sin_theta * sin_theta);
        }
        if energy_loss {
            self.e_loss = compute_energy_loss_mean(&self.slab, self.mass, self.qop, self.q);
            let sigma_qop = compute_energy_loss_landau_sigma_qop(&self.slab, self.mass, self.qop, self.q);
            self.variance_qop = sigma_qop * sigma_qop;
        }
    }

    /// Apply the energy loss to the momentum and add the noise to the
    /// covariance. Energy is lost moving forward and regained moving backward.
    pub fn update_state<S: Stepper>(&self, stepping: &mut StepperState, stepper: &S) {
        if self.e_loss != 0.0 {
            let energy = self.momentum.hypot(self.mass);
            let next_energy = energy - self.e_loss * self.nav_dir.sign();
            if next_energy > self.mass {
                let next_momentum = (next_energy * next_energy - self.mass * self.mass).sqrt();
                stepper.update_momentum(stepping, next_momentum);
            } else {
                warn!(
                    "Energy loss of {:.3} MeV would stop the particle on surface {}, momentum kept",
                    self.e_loss / MEV,
                    self.surface.geometry_id()
                );
            }
        }

        stepping.cov[(BOUND_PHI, BOUND_PHI)] += self.variance_phi;
        stepping.cov[(BOUND_THETA, BOUND_THETA)] += self.variance_theta;
        stepping.cov[(BOUND_QOP, BOUND_QOP)] += self.variance_qop;
    }
}

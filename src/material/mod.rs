//! Material description seen by the fitter
//!
//! A surface may carry a homogeneous slab of material. The slab is split
//! between the pre- and post-update stages of a Kalman step according to the
//! surface's split factor and the navigation direction.

pub mod interactions;

pub use interactions::*;

use crate::types::NavigationDirection;
use crate::units::{CM, EV, G_PER_CM3};
use serde::{Deserialize, Serialize};

/// Bulk material properties.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Radiation length (mm)
    pub x0: f64,
    /// Nuclear interaction length (mm)
    pub l0: f64,
    /// Relative atomic mass (g/mol)
    pub ar: f64,
    /// Atomic number
    pub z: f64,
    /// Mass density (g/cm³)
    pub mass_density: f64,
}

impl Material {
    pub fn new(x0: f64, l0: f64, ar: f64, z: f64, mass_density: f64) -> Self {
        Self {
            x0,
            l0,
            ar,
            z,
            mass_density,
        }
    }

    pub fn silicon() -> Self {
        Self::new(
            9.370 * CM,
            46.52 * CM,
            28.0855,
            14.0,
            2.329 * G_PER_CM3,
        )
    }

    pub fn is_valid(&self) -> bool {
        self.x0 > 0.0 && self.l0 > 0.0 && self.ar > 0.0 && self.z > 0.0 && self.mass_density > 0.0
    }

    /// Approximate mean excitation energy, I ≈ 16 eV · Z^0.9
    pub fn mean_excitation_energy(&self) -> f64 {
        16.0 * EV * self.z.powf(0.9)
    }
}

/// Material with a thickness.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialSlab {
    pub material: Material,
    /// Thickness along the surface normal (mm)
    pub thickness: f64,
}

impl MaterialSlab {
    pub fn new(material: Material, thickness: f64) -> Self {
        Self {
            material,
            thickness,
        }
    }

    pub fn thickness_in_x0(&self) -> f64 {
        if self.material.x0 > 0.0 {
            self.thickness / self.material.x0
        } else {
            0.0
        }
    }

    pub fn thickness_in_l0(&self) -> f64 {
        if self.material.l0 > 0.0 {
            self.thickness / self.material.l0
        } else {
            0.0
        }
    }

    pub fn scale_thickness(&mut self, factor: f64) {
        self.thickness *= factor;
    }

    pub fn is_valid(&self) -> bool {
        self.material.is_valid() && self.thickness > 0.0
    }
}

/// Stage of a Kalman step at which material is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialUpdateStage {
    PreUpdate,
    FullUpdate,
    PostUpdate,
}

impl MaterialUpdateStage {
    fn sign(&self) -> f64 {
        match self {
            MaterialUpdateStage::PreUpdate => -1.0,
            MaterialUpdateStage::FullUpdate => 0.0,
            MaterialUpdateStage::PostUpdate => 1.0,
        }
    }
}

/// Homogeneous material attached to a surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMaterial {
    slab: MaterialSlab,
    /// Share of the slab applied after the update when moving forward
    split_factor: f64,
}

impl SurfaceMaterial {
    pub fn homogeneous(slab: MaterialSlab) -> Self {
        Self {
            slab,
            split_factor: 0.0,
        }
    }

    pub fn with_split_factor(mut self, split_factor: f64) -> Self {
        self.split_factor = split_factor.clamp(0.0, 1.0);
        self
    }

    pub fn slab(&self) -> &MaterialSlab {
        &self.slab
    }

    pub fn split_factor(&self) -> f64 {
        self.split_factor
    }

    /// Fraction of the slab to apply for this direction and stage.
    pub fn factor(&self, nav_dir: NavigationDirection, stage: MaterialUpdateStage) -> f64 {
        if stage == MaterialUpdateStage::FullUpdate {
            return 1.0;
        }
        if nav_dir.sign() * stage.sign() > 0.0 {
            self.split_factor
        } else {
            1.0 - self.split_factor
        }
    }

    /// Slab scaled by [`SurfaceMaterial::factor`].
    pub fn material_slab(&self, nav_dir: NavigationDirection, stage: MaterialUpdateStage) -> MaterialSlab {
        let mut slab = self.slab;
        slab.scale_thickness(self.factor(nav_dir, stage));
        slab
    }
}

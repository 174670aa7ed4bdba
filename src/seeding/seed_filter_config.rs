use crate::units::MM;
use serde::{Deserialize, Serialize};

/// Seed confirmation cuts for one detector region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfirmationRangeConfig {
    /// z of the region's lower edge
    pub z_min_seed_conf: f32,
    /// z of the region's upper edge
    pub z_max_seed_conf: f32,
    /// Radius splitting small-r and large-r top space points
    pub r_max_seed_conf: f32,
    /// Compatible seeds required when the top space point is beyond `r_max_seed_conf`
    pub n_top_for_large_r: usize,
    /// Compatible seeds required otherwise
    pub n_top_for_small_r: usize,
}

impl Default for SeedConfirmationRangeConfig {
    fn default() -> Self {
        Self {
            z_min_seed_conf: f32::MIN,
            z_max_seed_conf: f32::MAX,
            r_max_seed_conf: f32::MAX,
            n_top_for_large_r: 0,
            n_top_for_small_r: 0,
        }
    }
}

fn is_infinite(value: &f32) -> bool {
    value.is_infinite()
}

/// Weighting and quality selection of track seeds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedFilterConfig {
    /// Allowed difference of inverted helix diameters for compatible seeds (1/mm)
    pub delta_inv_helix_diameter: f32,
    /// Factor on the impact parameter subtracted from the weight
    pub impact_weight_factor: f32,
    /// Weight added per compatible seed
    pub compat_seed_weight: f32,
    /// Minimum radial distance between compatible seeds (mm)
    pub delta_r_min: f32,
    /// Seeds kept per middle space point, highest weight first
    pub max_seeds_per_sp_m: u32,
    /// How often a compatible seed may raise the weight
    pub compat_seed_limit: usize,
    pub curvature_sorting_in_filter: bool,

    /// Extra weight once more than `num_seed_increment` compatible seeds
    /// were found, for high occupancy
    pub seed_weight_increment: f32,
    #[serde(skip_serializing_if = "is_infinite")]
    pub num_seed_increment: f32,

    pub seed_confirmation: bool,
    pub central_seed_confirmation_range: SeedConfirmationRangeConfig,
    pub forward_seed_confirmation_range: SeedConfirmationRangeConfig,
    /// Minimum radius of the bottom space point in seed confirmation (mm)
    pub seed_conf_min_bottom_radius: f32,
    /// Maximum z origin in seed confirmation (mm)
    pub seed_conf_max_z_origin: f32,
    /// Minimum impact parameter in seed confirmation (mm)
    pub min_impact_seed_conf: f32,
    /// Lower quality seeds kept in seed confirmation
    pub max_seeds_per_sp_m_conf: i32,
    /// Quality seeds kept per middle-bottom doublet in seed confirmation
    pub max_quality_seeds_per_sp_m_conf: i32,

    /// Search compatible space points by top-middle delta r instead of top radius
    pub use_delta_r_or_top_radius: bool,
}

impl Default for SeedFilterConfig {
    fn default() -> Self {
        let mm = MM as f32;
        Self {
            delta_inv_helix_diameter: 0.000_03 / mm,
            impact_weight_factor: 1.0,
            compat_seed_weight: 200.0,
            delta_r_min: 5.0 * mm,
            max_seeds_per_sp_m: 10,
            compat_seed_limit: 2,
            curvature_sorting_in_filter: false,
            seed_weight_increment: 0.0,
            num_seed_increment: f32::INFINITY,
            seed_confirmation: false,
            central_seed_confirmation_range: SeedConfirmationRangeConfig::default(),
            forward_seed_confirmation_range: SeedConfirmationRangeConfig::default(),
            seed_conf_min_bottom_radius: 60.0 * mm,
            seed_conf_max_z_origin: 150.0 * mm,
            min_impact_seed_conf: 1.0 * mm,
            max_seeds_per_sp_m_conf: i32::MAX,
            max_quality_seeds_per_sp_m_conf: i32::MAX,
            use_delta_r_or_top_radius: false,
        }
    }
}

impl SeedFilterConfig {
    /// Copy with every length field divided by one millimetre.
    pub fn to_internal_units(&self) -> Self {
        let mm = MM as f32;
        Self {
            delta_r_min: self.delta_r_min / mm,
            delta_inv_helix_diameter: self.delta_inv_helix_diameter / (1.0 / mm),
            seed_conf_min_bottom_radius: self.seed_conf_min_bottom_radius / mm,
            seed_conf_max_z_origin: self.seed_conf_max_z_origin / mm,
            min_impact_seed_conf: self.min_impact_seed_conf / mm,
            ..*self
        }
    }
}

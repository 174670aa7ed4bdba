//! Parameters for seed weighting and selection ahead of the fit

pub mod seed_filter_config;

pub use seed_filter_config::*;

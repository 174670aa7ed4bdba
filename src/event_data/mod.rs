//! Event data consumed and produced by a fit

pub mod measurement;
pub mod measurement_index;
pub mod multi_trajectory;
pub mod track_parameters;

pub use measurement::*;
pub use measurement_index::*;
pub use multi_trajectory::*;
pub use track_parameters::*;

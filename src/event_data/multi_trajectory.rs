//! Append-only arena of track states
//!
//! States reference their predecessor by index, which makes every state the
//! tip of a backward chain. States appended without a predecessor are
//! detached and are never reached from another chain.
//!
//! The arena has two writers during a fit with reversed filtering. The forward
//! pass owns everything it appends. The reversed pass appends its own detached
//! states and, on existing forward states, writes only the smoothed slot. The
//! forward pass never touches smoothed slots, so the two writers never alias.

use super::measurement::CalibratedMeasurement;
use super::track_parameters::transform_bound_to_free;
use crate::geometry::SurfaceRef;
use crate::types::*;
use std::ops::{Index, IndexMut};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackStateFlag {
    Measurement = 0,
    Parameter = 1,
    Outlier = 2,
    Hole = 3,
    Material = 4,
}

/// Set of [`TrackStateFlag`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackStateType(u8);

impl TrackStateType {
    pub fn set(&mut self, flag: TrackStateFlag) {
        self.0 |= 1 << flag as u8;
    }

    pub fn reset(&mut self, flag: TrackStateFlag) {
        self.0 &= !(1 << flag as u8);
    }

    pub fn test(&self, flag: TrackStateFlag) -> bool {
        self.0 & (1 << flag as u8) != 0
    }
}

/// Parameters with their covariance.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterEstimate {
    pub parameters: BoundVector,
    pub covariance: BoundMatrix,
}

impl ParameterEstimate {
    pub fn new(parameters: BoundVector, covariance: BoundMatrix) -> Self {
        Self {
            parameters,
            covariance,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrackState {
    index: usize,
    previous: Option<usize>,
    surface: SurfaceRef,
    pub predicted: Option<ParameterEstimate>,
    pub filtered: Option<ParameterEstimate>,
    pub smoothed: Option<ParameterEstimate>,
    /// Transport jacobian from the previous state's surface
    pub jacobian: Option<BoundMatrix>,
    pub path_length: f64,
    pub uncalibrated: Option<SourceLink>,
    pub calibrated: Option<CalibratedMeasurement>,
    pub chi2: f64,
    pub type_flags: TrackStateType,
}

impl TrackState {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    pub fn reference_surface(&self) -> &SurfaceRef {
        &self.surface
    }

    pub fn has_predicted(&self) -> bool {
        self.predicted.is_some()
    }

    pub fn has_filtered(&self) -> bool {
        self.filtered.is_some()
    }

    pub fn has_smoothed(&self) -> bool {
        self.smoothed.is_some()
    }

    pub fn has_jacobian(&self) -> bool {
        self.jacobian.is_some()
    }

    pub fn has_calibrated(&self) -> bool {
        self.calibrated.is_some()
    }

    pub fn has_uncalibrated(&self) -> bool {
        self.uncalibrated.is_some()
    }

    pub fn clear_smoothed(&mut self) {
        self.smoothed = None;
    }

    pub fn free_filtered(&self, gctx: &GeometryContext) -> Option<FreeVector> {
        self.filtered
            .as_ref()
            .map(|f| transform_bound_to_free(gctx, self.surface.as_ref(), &f.parameters))
    }

    pub fn free_smoothed(&self, gctx: &GeometryContext) -> Option<FreeVector> {
        self.smoothed
            .as_ref()
            .map(|s| transform_bound_to_free(gctx, self.surface.as_ref(), &s.parameters))
    }
}

#[derive(Clone, Debug, Default)]
pub struct MultiTrajectory {
    states: Vec<TrackState>,
}

impl MultiTrajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty state on `surface` and return its index.
    pub fn add_track_state(&mut self, surface: SurfaceRef, previous: Option<usize>) -> usize {
        let index = self.states.len();
        self.states.push(TrackState {
            index,
            previous,
            surface,
            predicted: None,
            filtered: None,
            smoothed: None,
            jacobian: None,
            path_length: 0.0,
            uncalibrated: None,
            calibrated: None,
            chi2: 0.0,
            type_flags: TrackStateType::default(),
        });
        index
    }

    pub fn get(&self, index: usize) -> Option<&TrackState> {
        self.states.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut TrackState> {
        self.states.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackState> {
        self.states.iter()
    }

    /// States from `tip` back to the start of its chain.
    pub fn backwards(&self, tip: usize) -> Backwards<'_> {
        Backwards {
            trajectory: self,
            next: Some(tip),
        }
    }

    /// Visit the chain ending at `tip`, newest first, until `visit` returns false.
    pub fn apply_backwards<F>(&mut self, tip: usize, mut visit: F)
    where
        F: FnMut(&mut TrackState) -> bool,
    {
        let mut current = Some(tip);
        while let Some(index) = current {
            let Some(state) = self.states.get_mut(index) else {
                break;
            };
            current = state.previous;
            if !visit(state) {
                break;
            }
        }
    }
}

impl Index<usize> for MultiTrajectory {
    type Output = TrackState;

    fn index(&self, index: usize) -> &TrackState {
        &self.states[index]
    }
}

impl IndexMut<usize> for MultiTrajectory {
    fn index_mut(&mut self, index: usize) -> &mut TrackState {
        &mut self.states[index]
    }
}

pub struct Backwards<'a> {
    trajectory: &'a MultiTrajectory,
    next: Option<usize>,
}

impl<'a> Iterator for Backwards<'a> {
    type Item = &'a TrackState;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.trajectory.get(self.next?)?;
        self.next = state.previous;
        Some(state)
    }
}

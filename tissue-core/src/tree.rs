use crate::{
    meander::MeanderStrategy,
    types::VesselId,
    vessel::{Vessel, VesselSegmentState},
    volume::TissueVolume,
};
use rand::Rng;

/// All vessels grown from one seed, in creation order.
///
/// Starts with exactly one root vessel; bifurcations only ever append.
#[derive(Clone, Debug, PartialEq)]
pub struct VesselTree {
    pub vessels: Vec<Vessel>,
}

impl VesselTree {
    pub fn new(root: VesselSegmentState) -> Self {
        Self {
            vessels: vec![Vessel::new(root)],
        }
    }

    /// Expands every unfinished vessel once and appends new branches.
    ///
    /// Vessels created during this call are not expanded until the next
    /// one, and each vessel bifurcates at most once per step. Returns the
    /// ids of the new branches.
    pub fn step(
        &mut self,
        volume: &mut TissueVolume,
        meander: MeanderStrategy,
        bending_factor: f64,
        rng: &mut impl Rng,
    ) -> Vec<VesselId> {
        let mut to_add = Vec::new();

        for vessel in self.vessels.iter_mut().filter(|v| !v.is_finished()) {
            vessel.expand(volume, meander, bending_factor, rng);
            if vessel.can_bifurcate() {
                to_add.push(vessel.bifurcate(rng));
            }
        }

        let first_new = self.vessels.len();
        self.vessels.extend(to_add);
        (first_new..self.vessels.len()).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.vessels.iter().all(Vessel::is_finished)
    }

    /// Steps until every vessel has finished; returns the number of steps.
    pub fn grow(
        &mut self,
        volume: &mut TissueVolume,
        meander: MeanderStrategy,
        bending_factor: f64,
        rng: &mut impl Rng,
    ) -> usize {
        let mut steps = 0;
        while !self.is_finished() {
            self.step(volume, meander, bending_factor, rng);
            steps += 1;
        }
        steps
    }
}

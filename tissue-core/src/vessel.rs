use crate::{
    meander::MeanderStrategy, rasterizer, types::Vector3, vector::VectorExt,
    volume::TissueVolume,
};
use rand::Rng;
use std::f64::consts::PI;
use tracing::trace;

/// Vessels thinner than this (in voxels) stop growing.
pub const MIN_RADIUS: f64 = 1.0;

/// Growth state of one vessel segment.
///
/// `position` is in voxel coordinates; `direction` is the travel per
/// growth step in physical units (millimeters).
#[derive(Clone, Debug, PartialEq)]
pub struct VesselSegmentState {
    pub position: Vector3,
    pub direction: Vector3,
    pub radius_in_voxels: f64,
    pub absorption: f64,
    pub scattering: f64,
    pub anisotropy: f64,
    /// Walked distance (voxels) after which the vessel bifurcates.
    pub bifurcation_frequency: f64,
    pub partial_volume: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vessel {
    pub state: VesselSegmentState,
    pub walked_distance: f64,
}

impl Vessel {
    pub fn new(state: VesselSegmentState) -> Self {
        Self {
            state,
            walked_distance: 0.0,
        }
    }

    /// A vessel is finished once its radius drops below [`MIN_RADIUS`];
    /// radii never grow back.
    pub fn is_finished(&self) -> bool {
        self.state.radius_in_voxels < MIN_RADIUS
    }

    /// Draws the current segment, then advances the direction.
    ///
    /// Drawing may zero the radius when the segment leaves the volume.
    /// Callers check [`Vessel::is_finished`] first.
    pub fn expand(
        &mut self,
        volume: &mut TissueVolume,
        meander: MeanderStrategy,
        bending_factor: f64,
        rng: &mut impl Rng,
    ) {
        rasterizer::draw(&mut self.state, volume);
        meander.apply(&mut self.state.direction, bending_factor, rng);
        self.walked_distance += self.state.direction.length() / volume.spacing();
    }

    pub fn can_bifurcate(&self) -> bool {
        self.walked_distance > self.state.bifurcation_frequency
    }

    /// Splits off a child vessel and returns it.
    ///
    /// The two branches turn away from each other by the same random
    /// angles and share the parent's cross-sectional area:
    /// `child_r^2 + parent_r_after^2 == parent_r_before^2`.
    pub fn bifurcate(&mut self, rng: &mut impl Rng) -> Vessel {
        let mut child = self.state.clone();

        let theta = random_branch_angle(rng);
        let phi = random_branch_angle(rng);
        child.direction.rotate_spherical(theta, phi);
        self.state.direction.rotate_spherical(-theta, -phi);

        let fraction = rng.random_range(0.6..=0.8);
        let parent_radius = self.state.radius_in_voxels;
        child.radius_in_voxels = fraction * parent_radius;
        self.state.radius_in_voxels =
            (parent_radius * parent_radius - child.radius_in_voxels * child.radius_in_voxels)
                .max(0.0)
                .sqrt();
        self.walked_distance = 0.0;

        trace!(
            target: "tissue-core",
            "bifurcation at {:?}: radius {:.3} -> {:.3} + {:.3}",
            self.state.position,
            parent_radius,
            self.state.radius_in_voxels,
            child.radius_in_voxels
        );

        Vessel::new(child)
    }
}

/// Uniform in `[pi/16, pi/8]` with a random sign.
fn random_branch_angle(rng: &mut impl Rng) -> f64 {
    let angle = rng.random_range(PI / 16.0..=PI / 8.0);
    if rng.random_bool(0.5) { angle } else { -angle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeSettings;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const EPS: f64 = 1e-9;

    fn volume(dim: usize) -> TissueVolume {
        let settings = VolumeSettings {
            x_dim: dim,
            y_dim: dim,
            z_dim: dim,
            spacing_mm: 1.0,
            ..VolumeSettings::default()
        };
        TissueVolume::new(&settings, &mut ChaCha8Rng::seed_from_u64(0))
    }

    fn state(position: Vector3, direction: Vector3, radius: f64) -> VesselSegmentState {
        VesselSegmentState {
            position,
            direction,
            radius_in_voxels: radius,
            absorption: 5.0,
            scattering: 12.0,
            anisotropy: 0.8,
            bifurcation_frequency: 2.5,
            partial_volume: false,
        }
    }

    #[test]
    fn straight_vessel_draws_one_voxel_per_step() {
        let mut vol = volume(10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut vessel = Vessel::new(state(Vector3::new(0.0, 4.0, 4.0), Vector3::X, 1.0));

        vessel.expand(&mut vol, MeanderStrategy::StraightLine, 0.0, &mut rng);
        assert!((vol.absorption_at(0, 4, 4).unwrap() - 5.0).abs() < EPS);
        assert!((vol.absorption_at(1, 4, 4).unwrap() - 5.0).abs() > EPS);

        vessel.expand(&mut vol, MeanderStrategy::StraightLine, 0.0, &mut rng);
        assert!((vol.absorption_at(1, 4, 4).unwrap() - 5.0).abs() < EPS);
        assert!((vol.absorption_at(2, 4, 4).unwrap() - 5.0).abs() > EPS);
    }

    #[test]
    fn can_bifurcate_after_walking_past_frequency_and_resets() {
        let mut vol = volume(20);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut vessel = Vessel::new(state(Vector3::new(0.0, 10.0, 10.0), Vector3::X, 3.0));

        assert!(!vessel.can_bifurcate());
        vessel.expand(&mut vol, MeanderStrategy::StraightLine, 0.0, &mut rng);
        vessel.expand(&mut vol, MeanderStrategy::StraightLine, 0.0, &mut rng);
        assert!(!vessel.can_bifurcate());
        vessel.expand(&mut vol, MeanderStrategy::StraightLine, 0.0, &mut rng);
        assert!(vessel.can_bifurcate());

        let child = vessel.bifurcate(&mut rng);
        assert!(!vessel.can_bifurcate());
        assert_eq!(vessel.walked_distance, 0.0);
        assert_eq!(child.walked_distance, 0.0);
        assert_eq!(child.state.position, vessel.state.position);
    }

    #[test]
    fn vessel_leaving_volume_finishes() {
        let mut vol = volume(5);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut vessel = Vessel::new(state(Vector3::new(3.0, 2.0, 2.0), Vector3::X, 1.5));

        let mut steps = 0;
        while !vessel.is_finished() {
            vessel.expand(&mut vol, MeanderStrategy::StraightLine, 0.0, &mut rng);
            steps += 1;
            assert!(steps < 10);
        }
        assert_eq!(vessel.state.radius_in_voxels, 0.0);
    }

    #[test]
    fn bifurcation_splits_directions_symmetrically() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let dir = Vector3::new(0.3, 0.4, 0.5);
        let mut parent = Vessel::new(state(Vector3::ZERO, dir, 4.0));
        let child = parent.bifurcate(&mut rng);

        assert!((parent.state.direction.length() - dir.length()).abs() < EPS);
        assert!((child.state.direction.length() - dir.length()).abs() < EPS);
        assert!(parent.state.direction != child.state.direction);

        let child_angle = child.state.direction.angle_between(dir);
        assert!(child_angle > 0.0);
        let ratio = child.state.radius_in_voxels / 4.0;
        assert!((0.6..=0.8).contains(&ratio));
    }

    proptest! {
        #[test]
        fn bifurcation_preserves_cross_section(seed in any::<u64>(), radius in 1.0f64..50.0) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut parent = Vessel::new(state(Vector3::ZERO, Vector3::new(1.0, 0.2, -0.3), radius));
            let child = parent.bifurcate(&mut rng);

            let before = radius * radius;
            let after = child.state.radius_in_voxels.powi(2) + parent.state.radius_in_voxels.powi(2);
            prop_assert!((before - after).abs() <= 1e-9 * before);
            prop_assert!(child.state.radius_in_voxels < radius);
            prop_assert!(parent.state.radius_in_voxels < radius);
        }
    }
}

//! Policies that evolve a vessel's travel direction between growth steps.

use crate::{types::Vector3, vector::VectorExt};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Directions at or below this length are treated as zero and re-randomized.
pub const DIRECTION_EPSILON: f64 = 1.19e-5;

/// Relative spread used by [`MeanderStrategy::RandomlyDiverging`].
const DIVERGENCE_PERCENTAGE: f64 = 0.4;

/// How a vessel's direction evolves at each growth step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeanderStrategy {
    /// Keep the direction constant once it is non-zero.
    StraightLine,
    /// Jitter the direction by the bending factor, then normalize it.
    #[default]
    RandomlyDiverging,
}

impl MeanderStrategy {
    /// Updates `direction` in place.
    ///
    /// Both strategies first replace a (near) zero direction with a fresh
    /// sample from `[-1, 1]^3`. A `bending_factor` of `0` turns
    /// [`MeanderStrategy::RandomlyDiverging`] into straight growth along
    /// the normalized direction.
    pub fn apply(&self, direction: &mut Vector3, bending_factor: f64, rng: &mut impl Rng) {
        if direction.length() <= DIRECTION_EPSILON {
            *direction = Vector3::random_unit_box(rng);
        }

        match self {
            Self::StraightLine => {}
            Self::RandomlyDiverging => {
                direction.randomize_by_percentage(DIVERGENCE_PERCENTAGE, bending_factor, rng);
                *direction = direction.normalize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn straight_line_keeps_non_zero_direction() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut dir = Vector3::new(0.5, 0.2, -0.1);
        for _ in 0..10 {
            MeanderStrategy::StraightLine.apply(&mut dir, 5.0, &mut rng);
        }
        assert_eq!(dir, Vector3::new(0.5, 0.2, -0.1));
    }

    #[test]
    fn straight_line_recovers_zero_direction() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut dir = Vector3::ZERO;
        MeanderStrategy::StraightLine.apply(&mut dir, 0.0, &mut rng);
        assert!(dir.length() > 0.0);
        assert!(dir.abs().max_element() <= 1.0);
    }

    #[test]
    fn diverging_output_is_unit_length() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut dir = Vector3::new(3.0, 0.0, 0.0);
        for _ in 0..50 {
            MeanderStrategy::RandomlyDiverging.apply(&mut dir, 0.3, &mut rng);
            assert!((dir.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn diverging_with_zero_bending_only_normalizes() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut dir = Vector3::new(0.0, 4.0, 3.0);
        MeanderStrategy::RandomlyDiverging.apply(&mut dir, 0.0, &mut rng);
        assert!((dir - Vector3::new(0.0, 0.8, 0.6)).length() < 1e-12);
    }

    #[test]
    fn diverging_actually_bends() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut dir = Vector3::X;
        MeanderStrategy::RandomlyDiverging.apply(&mut dir, 1.0, &mut rng);
        assert!((dir - Vector3::X).length() > 0.0);
    }
}

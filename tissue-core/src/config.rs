//! Generator parameters.
//!
//! Every struct is `serde`-friendly with defaults on each field, so a
//! partial TOML or JSON document only overrides what it names.

use crate::{
    error::{Result, TissueError},
    meander::MeanderStrategy,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Optical coefficients of one tissue class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpticalProperties {
    pub absorption: f64,
    pub scattering: f64,
    pub anisotropy: f64,
}

impl OpticalProperties {
    pub const fn new(absorption: f64, scattering: f64, anisotropy: f64) -> Self {
        Self {
            absorption,
            scattering,
            anisotropy,
        }
    }
}

/// Closed interval used for uniform parameter sampling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub const fn fixed(value: f64) -> Self {
        Self::new(value, value)
    }

    /// Draws uniformly from `[min, max]`; a collapsed or inverted range
    /// yields `min`.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        if self.max > self.min {
            rng.random_range(self.min..=self.max)
        } else {
            self.min
        }
    }

    /// Linear interpolation, `t = 0` gives `min` and `t = 1` gives `max`.
    pub fn lerp(&self, t: f64) -> f64 {
        self.min + (self.max - self.min) * t
    }
}

/// Shape, resolution and layering of the voxel grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSettings {
    pub x_dim: usize,
    pub y_dim: usize,
    pub z_dim: usize,
    /// Edge length of one (isotropic) voxel in millimeters.
    pub spacing_mm: f64,
    pub background: OpticalProperties,
    pub air: OpticalProperties,
    pub skin: OpticalProperties,
    pub air_thickness_mm: f64,
    pub skin_thickness_mm: f64,
    pub randomize_physical_properties: bool,
    /// Spread of the per-voxel background perturbation, in percent.
    pub randomization_percentage: f64,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            x_dim: 80,
            y_dim: 80,
            z_dim: 40,
            spacing_mm: 0.5,
            background: OpticalProperties::new(0.1, 15.0, 0.9),
            air: OpticalProperties::new(1e-10, 1e-10, 1.0),
            skin: OpticalProperties::new(3.0, 20.0, 0.9),
            air_thickness_mm: 1.0,
            skin_thickness_mm: 0.5,
            randomize_physical_properties: false,
            randomization_percentage: 10.0,
        }
    }
}

impl VolumeSettings {
    pub fn dims(&self) -> [usize; 3] {
        [self.x_dim, self.y_dim, self.z_dim]
    }
}

/// Ranges the per-vessel parameters are drawn from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselSettings {
    pub min_vessels: u32,
    pub max_vessels: u32,
    pub bending_factor: ValueRange,
    pub absorption: ValueRange,
    pub radius_mm: ValueRange,
    pub scattering: ValueRange,
    pub anisotropy: ValueRange,
    /// Start depth below the `z = 0` face, in millimeters.
    pub depth_mm: ValueRange,
    /// Walked distance (voxels) after which a vessel bifurcates.
    pub bifurcation_frequency: f64,
    /// Spread of the initial direction on the two in-plane axes.
    pub start_direction_variance: f64,
    pub meander: MeanderStrategy,
    pub partial_volume: bool,
}

impl Default for VesselSettings {
    fn default() -> Self {
        Self {
            min_vessels: 1,
            max_vessels: 5,
            bending_factor: ValueRange::new(0.1, 0.3),
            absorption: ValueRange::new(2.0, 8.0),
            radius_mm: ValueRange::new(0.5, 2.0),
            scattering: ValueRange::new(15.0, 15.0),
            anisotropy: ValueRange::new(0.9, 0.9),
            depth_mm: ValueRange::new(3.0, 15.0),
            bifurcation_frequency: 50.0,
            start_direction_variance: 0.2,
            meander: MeanderStrategy::RandomlyDiverging,
            partial_volume: false,
        }
    }
}

/// Complete input of one generation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub volume: VolumeSettings,
    pub vessels: VesselSettings,
    /// Sigma (voxels) of the final Gaussian smoothing; `0` disables it.
    pub smoothing_sigma: f64,
    /// Phantom only: generate at twice the resolution and downsample.
    pub supersample: bool,
    /// Fixed RNG seed; `None` draws one from the system.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            volume: VolumeSettings::default(),
            vessels: VesselSettings::default(),
            smoothing_sigma: 0.5,
            supersample: false,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    /// Checks for degenerate settings.
    ///
    /// Generation itself never calls this; drivers do before a batch.
    pub fn validate(&self) -> Result<()> {
        let v = &self.volume;
        if v.dims().contains(&0) {
            return Err(TissueError::InvalidConfig(format!(
                "volume dimensions must be non-zero, got {:?}",
                v.dims()
            )));
        }
        if !(v.spacing_mm > 0.0) {
            return Err(TissueError::InvalidConfig(format!(
                "voxel spacing must be positive, got {}",
                v.spacing_mm
            )));
        }
        if v.air_thickness_mm < 0.0 || v.skin_thickness_mm < 0.0 {
            return Err(TissueError::InvalidConfig(
                "layer thicknesses must not be negative".into(),
            ));
        }

        let s = &self.vessels;
        if s.min_vessels > s.max_vessels {
            return Err(TissueError::InvalidConfig(format!(
                "min_vessels ({}) exceeds max_vessels ({})",
                s.min_vessels, s.max_vessels
            )));
        }
        let ranges = [
            ("bending_factor", s.bending_factor),
            ("absorption", s.absorption),
            ("radius_mm", s.radius_mm),
            ("scattering", s.scattering),
            ("anisotropy", s.anisotropy),
            ("depth_mm", s.depth_mm),
        ];
        for (name, range) in ranges {
            if range.min > range.max {
                return Err(TissueError::InvalidConfig(format!(
                    "{name}: min {} exceeds max {}",
                    range.min, range.max
                )));
            }
        }
        if self.smoothing_sigma < 0.0 {
            return Err(TissueError::InvalidConfig(
                "smoothing_sigma must not be negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(GeneratorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_inverted_vessel_counts() {
        let mut cfg = GeneratorConfig::default();
        cfg.vessels.min_vessels = 4;
        cfg.vessels.max_vessels = 2;
        assert!(matches!(cfg.validate(), Err(TissueError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_zero_dimension_and_bad_spacing() {
        let mut cfg = GeneratorConfig::default();
        cfg.volume.y_dim = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = GeneratorConfig::default();
        cfg.volume.spacing_mm = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut cfg = GeneratorConfig::default();
        cfg.vessels.radius_mm = ValueRange::new(2.0, 1.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sample_stays_in_range_and_handles_collapsed_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let range = ValueRange::new(1.5, 2.5);
        for _ in 0..100 {
            let v = range.sample(&mut rng);
            assert!((1.5..=2.5).contains(&v));
        }
        assert_eq!(ValueRange::fixed(3.0).sample(&mut rng), 3.0);
        assert_eq!(ValueRange::new(4.0, 1.0).sample(&mut rng), 4.0);
    }
}

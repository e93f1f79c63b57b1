//! Orchestration of one generation run.
//!
//! A run owns its RNG, its [`TissueVolume`] and its vessel trees:
//! 1. seed the RNG ([`seeded_rng`]),
//! 2. allocate the background volume,
//! 3. seed and grow one [`VesselTree`] per vessel,
//! 4. smooth the coefficient arrays,
//! 5. apply the air/skin layering.

use crate::{
    config::{GeneratorConfig, VesselSettings},
    error::Result,
    filters::{gaussian_blur_3d, rescale_image},
    meander::MeanderStrategy,
    tree::VesselTree,
    types::Vector3,
    vessel::VesselSegmentState,
    volume::{Coefficient, TissueVolume},
};
use rand::{Rng, SeedableRng, TryRngCore, rngs::OsRng};
use rand_chacha::ChaCha8Rng;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Number of vessels in a validation phantom.
pub const PHANTOM_VESSELS: usize = 5;

/// Walked distance no phantom vessel reaches, so phantoms never branch.
pub const PHANTOM_BIFURCATION_FREQUENCY: f64 = 50_000.0;

/// Builds the run's RNG and reports the seed it was built from.
///
/// Uses `seed` when given, else a seed from the operating system, else
/// the current time in milliseconds.
pub fn seeded_rng(seed: Option<u64>) -> (ChaCha8Rng, u64) {
    let seed = seed.unwrap_or_else(|| match OsRng.try_next_u64() {
        Ok(seed) => seed,
        Err(err) => {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default();
            warn!(target: "tissue-core", "system entropy unavailable ({err}), seeding from time {millis}");
            millis
        }
    });
    (ChaCha8Rng::seed_from_u64(seed), seed)
}

/// Generates a randomized tissue volume.
///
/// The seed actually used is stored as the `generator.seed` property.
pub fn generate_tissue(config: &GeneratorConfig) -> TissueVolume {
    let (mut rng, seed) = seeded_rng(config.seed);
    info!(target: "tissue-core", "generating tissue with seed {seed}");

    let mut volume = generate_tissue_with_rng(config, &mut rng);
    volume.set_property("generator.seed", seed.to_string());
    volume
}

/// Same as [`generate_tissue`], drawing from a caller-supplied RNG.
pub fn generate_tissue_with_rng(config: &GeneratorConfig, rng: &mut impl Rng) -> TissueVolume {
    let mut volume = TissueVolume::new(&config.volume, rng);
    let vessels = &config.vessels;

    let vessel_count = if vessels.max_vessels > vessels.min_vessels {
        rng.random_range(vessels.min_vessels..=vessels.max_vessels)
    } else {
        vessels.min_vessels
    };
    volume.set_property("generator.kind", "random");
    volume.set_property("generator.vessel_count", vessel_count);

    info!(
        target: "tissue-core",
        "growing {} vessels in a {:?} volume (spacing {} mm)",
        vessel_count,
        volume.dims(),
        volume.spacing()
    );

    for index in 0..vessel_count {
        let (state, bending_factor) = seed_vessel(index, vessels, &mut volume, rng);
        let mut tree = VesselTree::new(state);
        let steps = tree.grow(&mut volume, vessels.meander, bending_factor, rng);
        debug!(
            target: "tissue-core",
            "vessel {index} finished after {steps} steps with {} branches",
            tree.vessels.len()
        );
    }

    smooth(&mut volume, config.smoothing_sigma);
    volume.finalize_volume();

    info!(
        target: "tissue-core",
        "tissue generated, vessel fraction {:.4}",
        volume.vessel_fraction()
    );
    volume
}

/// Samples one vessel's parameters and start pose, recording them as
/// `vessel_<index>.*` properties.
fn seed_vessel(
    index: u32,
    settings: &VesselSettings,
    volume: &mut TissueVolume,
    rng: &mut impl Rng,
) -> (VesselSegmentState, f64) {
    let spacing = volume.spacing();
    let bending_factor = settings.bending_factor.sample(rng);
    let absorption = settings.absorption.sample(rng);
    let radius = settings.radius_mm.sample(rng) / spacing;
    let scattering = settings.scattering.sample(rng);
    let anisotropy = settings.anisotropy.sample(rng);

    let [dx, dy, dz] = volume.dims().map(|d| d as f64);
    let face = rng.random_range(0..4u32);
    let along_x = within_margin(dx, radius, rng);
    let along_y = within_margin(dy, radius, rng);
    let depth = (settings.depth_mm.sample(rng) / spacing).clamp(0.0, (dz - 1.0).max(0.0));

    let variance = settings.start_direction_variance.abs();
    let mut spread = || {
        if variance > 0.0 {
            rng.random_range(-variance..=variance)
        } else {
            0.0
        }
    };
    let (s1, s2) = (spread(), spread());

    let (position, direction) = match face {
        0 => (Vector3::new(0.0, along_y, depth), Vector3::new(1.0, s1, s2)),
        1 => (Vector3::new(dx - 1.0, along_y, depth), Vector3::new(-1.0, s1, s2)),
        2 => (Vector3::new(along_x, 0.0, depth), Vector3::new(s1, 1.0, s2)),
        _ => (Vector3::new(along_x, dy - 1.0, depth), Vector3::new(s1, -1.0, s2)),
    };

    let key = |name: &str| format!("vessel_{index}.{name}");
    volume.set_property(key("bending_factor"), bending_factor);
    volume.set_property(key("absorption"), absorption);
    volume.set_property(key("radius_in_voxels"), radius);
    volume.set_property(key("scattering"), scattering);
    volume.set_property(key("anisotropy"), anisotropy);
    volume.set_property(key("start_face"), face);

    debug!(
        target: "tissue-core",
        "vessel {index}: face {face}, start {position:?}, radius {radius:.2} voxels, absorption {absorption:.3}"
    );

    let state = VesselSegmentState {
        position,
        direction,
        radius_in_voxels: radius,
        absorption,
        scattering,
        anisotropy,
        bifurcation_frequency: settings.bifurcation_frequency,
        partial_volume: settings.partial_volume,
    };
    (state, bending_factor)
}

/// Uniform coordinate in `[margin, len - 1 - margin]`, or the centre when
/// the axis is too short for the margin.
fn within_margin(len: f64, margin: f64, rng: &mut impl Rng) -> f64 {
    let hi = len - 1.0 - margin;
    if hi > margin {
        rng.random_range(margin..=hi)
    } else {
        ((len - 1.0) / 2.0).max(0.0)
    }
}

fn smooth(volume: &mut TissueVolume, sigma: f64) {
    if sigma <= 0.0 {
        return;
    }
    for c in Coefficient::ALL {
        gaussian_blur_3d(&mut volume.coefficient_mut(c), sigma);
    }
}

/// Generates a deterministic validation phantom.
///
/// [`PHANTOM_VESSELS`] straight, non-branching vessels enter through the
/// `x = 0` face at regularly spaced heights, with absorptions spread evenly
/// over the configured range. With `supersample` set the phantom is drawn
/// at twice the resolution and downsampled, which approximates partial
/// volume averaging at vessel boundaries.
pub fn generate_phantom(config: &GeneratorConfig) -> Result<TissueVolume> {
    let (mut rng, seed) = seeded_rng(config.seed);
    let scale = if config.supersample { 2 } else { 1 };

    let mut settings = config.volume.clone();
    settings.x_dim *= scale;
    settings.y_dim *= scale;
    settings.z_dim *= scale;
    settings.spacing_mm /= scale as f64;

    info!(
        target: "tissue-core",
        "generating phantom at {:?} (supersample: {})",
        settings.dims(),
        config.supersample
    );

    let mut volume = TissueVolume::new(&settings, &mut rng);
    volume.set_property("generator.kind", "phantom");
    volume.set_property("generator.seed", seed.to_string());

    let vessels = &config.vessels;
    let spacing = settings.spacing_mm;
    let [_, dy, dz] = settings.dims().map(|d| d as f64);
    let depth = (vessels.depth_mm.lerp(0.5) / spacing).clamp(0.0, (dz - 1.0).max(0.0));

    for index in 0..PHANTOM_VESSELS {
        let t = index as f64 / (PHANTOM_VESSELS - 1) as f64;
        let y = ((index + 1) as f64 * dy / (PHANTOM_VESSELS + 1) as f64).floor();
        let state = VesselSegmentState {
            position: Vector3::new(0.0, y, depth),
            direction: Vector3::X,
            radius_in_voxels: vessels.radius_mm.min / spacing,
            absorption: vessels.absorption.lerp(t),
            scattering: vessels.scattering.lerp(0.5),
            anisotropy: vessels.anisotropy.lerp(0.5),
            bifurcation_frequency: PHANTOM_BIFURCATION_FREQUENCY,
            partial_volume: vessels.partial_volume,
        };
        volume.set_property(format!("vessel_{index}.absorption"), state.absorption);
        volume.set_property(format!("vessel_{index}.radius_in_voxels"), state.radius_in_voxels);

        let mut tree = VesselTree::new(state);
        let steps = tree.grow(&mut volume, MeanderStrategy::StraightLine, 0.0, &mut rng);
        debug!(target: "tissue-core", "phantom vessel {index} finished after {steps} steps");
    }

    smooth(&mut volume, config.smoothing_sigma * scale as f64);
    if config.supersample {
        rescale_image(&mut volume, 0.5)?;
    }
    volume.finalize_volume();
    Ok(volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ValueRange, volume::{PropertyValue, SegmentationType}};

    fn small_config() -> GeneratorConfig {
        let mut cfg = GeneratorConfig::default();
        cfg.volume.x_dim = 24;
        cfg.volume.y_dim = 24;
        cfg.volume.z_dim = 16;
        cfg.volume.spacing_mm = 0.5;
        cfg.vessels.min_vessels = 2;
        cfg.vessels.max_vessels = 3;
        cfg.vessels.radius_mm = ValueRange::new(0.75, 1.5);
        cfg.vessels.depth_mm = ValueRange::new(2.0, 6.0);
        cfg.vessels.bifurcation_frequency = 10.0;
        cfg.seed = Some(1234);
        cfg
    }

    #[test]
    fn fixed_seed_is_reported_and_reproducible() {
        let (mut a, seed) = seeded_rng(Some(99));
        let (mut b, _) = seeded_rng(Some(99));
        assert_eq!(seed, 99);
        assert_eq!(a.random::<u64>(), b.random::<u64>());
    }

    #[test]
    fn unseeded_rngs_differ() {
        let (_, s1) = seeded_rng(None);
        let (_, s2) = seeded_rng(None);
        assert_ne!(s1, s2);
    }

    #[test]
    fn vessels_start_on_a_face_pointing_inward() {
        let cfg = small_config();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for i in 0..40 {
            let mut volume = TissueVolume::new(&cfg.volume, &mut rng);
            let (state, _) = seed_vessel(i, &cfg.vessels, &mut volume, &mut rng);
            let p = state.position;
            let d = state.direction;
            let on_face = match volume.property(&format!("vessel_{i}.start_face")) {
                Some(PropertyValue::Number(f)) if *f == 0.0 => p.x == 0.0 && d.x == 1.0,
                Some(PropertyValue::Number(f)) if *f == 1.0 => p.x == 23.0 && d.x == -1.0,
                Some(PropertyValue::Number(f)) if *f == 2.0 => p.y == 0.0 && d.y == 1.0,
                Some(PropertyValue::Number(f)) if *f == 3.0 => p.y == 23.0 && d.y == -1.0,
                other => panic!("unexpected start face {other:?}"),
            };
            assert!(on_face);
            assert!((4.0..=12.0).contains(&p.z));
            assert!((1.5..=3.0).contains(&state.radius_in_voxels));
            assert!(volume.is_inside_volume(p.x as i64, p.y as i64, p.z as i64));
        }
    }

    #[test]
    fn generation_records_provenance() {
        let volume = generate_tissue(&small_config());
        assert_eq!(volume.property("generator.seed"), Some(&PropertyValue::from("1234")));
        let Some(PropertyValue::Number(count)) = volume.property("generator.vessel_count") else {
            panic!("vessel count missing");
        };
        assert!((2.0..=3.0).contains(count));
        for i in 0..*count as u32 {
            assert!(volume.property(&format!("vessel_{i}.absorption")).is_some());
        }
        assert!(volume.label_count(SegmentationType::Vessel) > 0);
    }

    #[test]
    fn smoothing_with_zero_sigma_keeps_values() {
        let cfg = small_config();
        let mut volume = TissueVolume::new(&cfg.volume, &mut ChaCha8Rng::seed_from_u64(0));
        let before = volume.clone();
        smooth(&mut volume, 0.0);
        assert_eq!(volume, before);
    }

    #[test]
    fn within_margin_falls_back_to_centre() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(within_margin(5.0, 3.0, &mut rng), 2.0);
        let v = within_margin(20.0, 2.0, &mut rng);
        assert!((2.0..=17.0).contains(&v));
    }
}

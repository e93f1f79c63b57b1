//! The voxel grid: four parallel per-voxel arrays plus metadata.

use crate::{
    config::{OpticalProperties, VolumeSettings},
    error::{Result, TissueError},
};
use ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Per-voxel tissue class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum SegmentationType {
    Air = -1,
    #[default]
    Background = 0,
    Vessel = 1,
    Fat = 2,
    Skin = 3,
}

impl SegmentationType {
    pub fn value(self) -> i8 {
        self as i8
    }
}

impl TryFrom<f64> for SegmentationType {
    type Error = TissueError;

    fn try_from(value: f64) -> Result<Self> {
        match value {
            v if v == -1.0 => Ok(Self::Air),
            v if v == 0.0 => Ok(Self::Background),
            v if v == 1.0 => Ok(Self::Vessel),
            v if v == 2.0 => Ok(Self::Fat),
            v if v == 3.0 => Ok(Self::Skin),
            v => Err(TissueError::UnknownLabel(v)),
        }
    }
}

/// One of the three continuous coefficient arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coefficient {
    Absorption,
    Scattering,
    Anisotropy,
}

impl Coefficient {
    pub const ALL: [Coefficient; 3] = [Self::Absorption, Self::Scattering, Self::Anisotropy];

    pub fn name(self) -> &'static str {
        match self {
            Self::Absorption => "absorption",
            Self::Scattering => "scattering",
            Self::Anisotropy => "anisotropy",
        }
    }

    fn of(self, props: &OpticalProperties) -> f64 {
        match self {
            Self::Absorption => props.absorption,
            Self::Scattering => props.scattering,
            Self::Anisotropy => props.anisotropy,
        }
    }
}

/// Provenance value stored in the property bag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        Self::Number(v.into())
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Air and skin layers applied once by [`TissueVolume::finalize_volume`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layering {
    pub air: OpticalProperties,
    pub skin: OpticalProperties,
    pub air_thickness_mm: f64,
    pub skin_thickness_mm: f64,
}

impl Layering {
    /// No air and no skin.
    pub fn none() -> Self {
        Self {
            air: OpticalProperties::new(0.0, 0.0, 0.0),
            skin: OpticalProperties::new(0.0, 0.0, 0.0),
            air_thickness_mm: 0.0,
            skin_thickness_mm: 0.0,
        }
    }
}

impl From<&VolumeSettings> for Layering {
    fn from(s: &VolumeSettings) -> Self {
        Self {
            air: s.air,
            skin: s.skin,
            air_thickness_mm: s.air_thickness_mm,
            skin_thickness_mm: s.skin_thickness_mm,
        }
    }
}

/// Synthetic tissue volume indexed `[[x, y, z]]`.
///
/// All four arrays share one shape, fixed at construction. Point accessors
/// are bounds-checked: reads outside the grid return `None` and writes are
/// ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct TissueVolume {
    absorption: Array3<f64>,
    scattering: Array3<f64>,
    anisotropy: Array3<f64>,
    segmentation: Array3<SegmentationType>,
    spacing: f64,
    layering: Layering,
    properties: BTreeMap<String, PropertyValue>,
    finalized: bool,
}

impl TissueVolume {
    /// Allocates a volume filled with the background tissue.
    ///
    /// With `randomize_physical_properties` set, every voxel's background
    /// coefficients are scaled by independent factors drawn from
    /// `1 ± randomization_percentage / 100` using `rng`.
    pub fn new(settings: &VolumeSettings, rng: &mut impl Rng) -> Self {
        let dims = (settings.x_dim, settings.y_dim, settings.z_dim);
        let bg = settings.background;

        let (absorption, scattering, anisotropy) = if settings.randomize_physical_properties {
            let p = settings.randomization_percentage.abs() / 100.0;
            let mut jitter = |v: f64| {
                if p > 0.0 {
                    v * (1.0 + rng.random_range(-p..=p))
                } else {
                    v
                }
            };
            let absorption = Array3::from_shape_fn(dims, |_| jitter(bg.absorption));
            let scattering = Array3::from_shape_fn(dims, |_| jitter(bg.scattering));
            let anisotropy = Array3::from_shape_fn(dims, |_| jitter(bg.anisotropy));
            (absorption, scattering, anisotropy)
        } else {
            (
                Array3::from_elem(dims, bg.absorption),
                Array3::from_elem(dims, bg.scattering),
                Array3::from_elem(dims, bg.anisotropy),
            )
        };

        Self {
            absorption,
            scattering,
            anisotropy,
            segmentation: Array3::from_elem(dims, SegmentationType::Background),
            spacing: settings.spacing_mm,
            layering: Layering::from(settings),
            properties: BTreeMap::new(),
            finalized: false,
        }
    }

    /// Wraps already computed arrays, e.g. after resampling.
    pub fn from_arrays(
        absorption: Array3<f64>,
        scattering: Array3<f64>,
        anisotropy: Array3<f64>,
        segmentation: Array3<SegmentationType>,
        spacing: f64,
        layering: Layering,
    ) -> Result<Self> {
        let expected = shape_of(absorption.shape());
        for found in [
            shape_of(scattering.shape()),
            shape_of(anisotropy.shape()),
            shape_of(segmentation.shape()),
        ] {
            if found != expected {
                return Err(TissueError::ShapeMismatch { expected, found });
            }
        }

        Ok(Self::from_parts(
            absorption,
            scattering,
            anisotropy,
            segmentation,
            spacing,
            layering,
        ))
    }

    fn from_parts(
        absorption: Array3<f64>,
        scattering: Array3<f64>,
        anisotropy: Array3<f64>,
        segmentation: Array3<SegmentationType>,
        spacing: f64,
        layering: Layering,
    ) -> Self {
        Self {
            absorption,
            scattering,
            anisotropy,
            segmentation,
            spacing,
            layering,
            properties: BTreeMap::new(),
            finalized: false,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        shape_of(self.absorption.shape())
    }

    /// Edge length of one voxel in millimeters.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Swaps in resampled arrays, keeping properties, layering and state.
    pub(crate) fn replace_grid(
        &mut self,
        absorption: Array3<f64>,
        scattering: Array3<f64>,
        anisotropy: Array3<f64>,
        segmentation: Array3<SegmentationType>,
        spacing: f64,
    ) {
        self.absorption = absorption;
        self.scattering = scattering;
        self.anisotropy = anisotropy;
        self.segmentation = segmentation;
        self.spacing = spacing;
    }

    pub fn layering(&self) -> &Layering {
        &self.layering
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_inside_volume(&self, x: i64, y: i64, z: i64) -> bool {
        let [dx, dy, dz] = self.dims();
        x >= 0 && y >= 0 && z >= 0 && (x as usize) < dx && (y as usize) < dy && (z as usize) < dz
    }

    fn index(&self, x: usize, y: usize, z: usize) -> Option<[usize; 3]> {
        let [dx, dy, dz] = self.dims();
        (x < dx && y < dy && z < dz).then_some([x, y, z])
    }

    /// Writes one voxel; returns `false` (and writes nothing) outside the grid.
    pub fn set_volume_values(
        &mut self,
        x: usize,
        y: usize,
        z: usize,
        props: OpticalProperties,
        label: SegmentationType,
    ) -> bool {
        let Some(idx) = self.index(x, y, z) else {
            return false;
        };
        self.absorption[idx] = props.absorption;
        self.scattering[idx] = props.scattering;
        self.anisotropy[idx] = props.anisotropy;
        self.segmentation[idx] = label;
        true
    }

    pub fn optical_properties_at(&self, x: usize, y: usize, z: usize) -> Option<OpticalProperties> {
        let idx = self.index(x, y, z)?;
        Some(OpticalProperties::new(
            self.absorption[idx],
            self.scattering[idx],
            self.anisotropy[idx],
        ))
    }

    pub fn absorption_at(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        self.index(x, y, z).map(|idx| self.absorption[idx])
    }

    pub fn scattering_at(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        self.index(x, y, z).map(|idx| self.scattering[idx])
    }

    pub fn anisotropy_at(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        self.index(x, y, z).map(|idx| self.anisotropy[idx])
    }

    pub fn segmentation_at(&self, x: usize, y: usize, z: usize) -> Option<SegmentationType> {
        self.index(x, y, z).map(|idx| self.segmentation[idx])
    }

    pub fn coefficient(&self, c: Coefficient) -> ArrayView3<'_, f64> {
        match c {
            Coefficient::Absorption => self.absorption.view(),
            Coefficient::Scattering => self.scattering.view(),
            Coefficient::Anisotropy => self.anisotropy.view(),
        }
    }

    /// Mutable view of one coefficient array; its shape cannot change.
    pub fn coefficient_mut(&mut self, c: Coefficient) -> ArrayViewMut3<'_, f64> {
        match c {
            Coefficient::Absorption => self.absorption.view_mut(),
            Coefficient::Scattering => self.scattering.view_mut(),
            Coefficient::Anisotropy => self.anisotropy.view_mut(),
        }
    }

    pub fn segmentation(&self) -> ArrayView3<'_, SegmentationType> {
        self.segmentation.view()
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub(crate) fn set_properties(&mut self, properties: BTreeMap<String, PropertyValue>) {
        self.properties = properties;
    }

    pub fn label_count(&self, label: SegmentationType) -> usize {
        self.segmentation.iter().filter(|&&l| l == label).count()
    }

    /// Share of voxels labelled [`SegmentationType::Vessel`].
    pub fn vessel_fraction(&self) -> f64 {
        let total = self.segmentation.len();
        if total == 0 {
            0.0
        } else {
            self.label_count(SegmentationType::Vessel) as f64 / total as f64
        }
    }

    /// Applies the air and skin layers from the `z = 0` face inward.
    ///
    /// Thicknesses are converted to voxels with the current spacing. A slice
    /// only partly covered by a layer receives the coverage-weighted mix of
    /// the layers overlapping it and its previous value. Runs once; later
    /// calls are ignored.
    pub fn finalize_volume(&mut self) {
        if self.finalized {
            debug!(target: "tissue-core", "volume already finalized, skipping layering");
            return;
        }
        self.finalized = true;

        let air_end = (self.layering.air_thickness_mm / self.spacing).max(0.0);
        let skin_end = air_end + (self.layering.skin_thickness_mm / self.spacing).max(0.0);
        let z_dim = self.dims()[2];
        let layered_slices = (skin_end.ceil() as usize).min(z_dim);

        let air = self.layering.air;
        let skin = self.layering.skin;

        for z in 0..layered_slices {
            let lo = z as f64;
            let hi = lo + 1.0;
            let air_cov = (air_end.min(hi) - lo).clamp(0.0, 1.0);
            let skin_cov = (skin_end.min(hi) - air_end.max(lo)).clamp(0.0, 1.0);
            let interior = (1.0 - air_cov - skin_cov).max(0.0);
            if air_cov + skin_cov <= 0.0 {
                continue;
            }

            for c in Coefficient::ALL {
                let (a, s) = (c.of(&air), c.of(&skin));
                self.coefficient_mut(c)
                    .index_axis_mut(Axis(2), z)
                    .mapv_inplace(|v| air_cov * a + skin_cov * s + interior * v);
            }

            let label = if air_cov >= skin_cov && air_cov >= interior {
                Some(SegmentationType::Air)
            } else if skin_cov >= interior {
                Some(SegmentationType::Skin)
            } else {
                None
            };
            if let Some(label) = label {
                self.segmentation.index_axis_mut(Axis(2), z).fill(label);
            }
        }

        debug!(
            target: "tissue-core",
            "finalized volume: {:.2} air voxels, {:.2} skin voxels",
            air_end,
            skin_end - air_end
        );
    }
}

fn shape_of(shape: &[usize]) -> [usize; 3] {
    [shape[0], shape[1], shape[2]]
}

//! Export/import boundary to the host application's multi-channel image.
//!
//! The host container itself is opaque to this crate; [`ChannelImage`] is
//! the neutral form handed across: named `f64` channels, the voxel spacing
//! and the provenance properties.

use crate::{
    error::{Result, TissueError},
    volume::{Coefficient, Layering, PropertyValue, SegmentationType, TissueVolume},
};
use ndarray::Array3;
use std::collections::BTreeMap;

pub const SEGMENTATION_CHANNEL: &str = "segmentation";

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelImage {
    pub spacing: f64,
    pub channels: BTreeMap<String, Array3<f64>>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ChannelImage {
    pub fn channel(&self, name: &str) -> Result<&Array3<f64>> {
        self.channels
            .get(name)
            .ok_or_else(|| TissueError::MissingChannel(name.to_owned()))
    }
}

impl TissueVolume {
    /// Copies the four arrays out as channels; labels become their
    /// numeric values.
    pub fn to_channel_image(&self) -> ChannelImage {
        let mut channels: BTreeMap<String, Array3<f64>> = Coefficient::ALL
            .iter()
            .map(|&c| (c.name().to_owned(), self.coefficient(c).to_owned()))
            .collect();
        channels.insert(
            SEGMENTATION_CHANNEL.to_owned(),
            self.segmentation().mapv(|l| f64::from(l.value())),
        );

        ChannelImage {
            spacing: self.spacing(),
            channels,
            properties: self.properties().clone(),
        }
    }

    /// Re-wraps channels produced elsewhere (or by [`Self::to_channel_image`]).
    pub fn from_channel_image(image: &ChannelImage, layering: Layering) -> Result<Self> {
        let [absorption, scattering, anisotropy] =
            Coefficient::ALL.map(|c| image.channel(c.name()).cloned());

        let raw_labels = image.channel(SEGMENTATION_CHANNEL)?;
        let mut segmentation = Array3::from_elem(raw_labels.raw_dim(), SegmentationType::Background);
        for (idx, &value) in raw_labels.indexed_iter() {
            segmentation[idx] = SegmentationType::try_from(value)?;
        }

        let mut volume = TissueVolume::from_arrays(
            absorption?,
            scattering?,
            anisotropy?,
            segmentation,
            image.spacing,
            layering,
        )?;
        volume.set_properties(image.properties.clone());
        Ok(volume)
    }
}

impl From<&TissueVolume> for ChannelImage {
    fn from(volume: &TissueVolume) -> Self {
        volume.to_channel_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OpticalProperties, VolumeSettings};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample_volume() -> TissueVolume {
        let settings = VolumeSettings {
            x_dim: 5,
            y_dim: 4,
            z_dim: 3,
            spacing_mm: 0.3,
            randomize_physical_properties: true,
            ..VolumeSettings::default()
        };
        let mut volume = TissueVolume::new(&settings, &mut ChaCha8Rng::seed_from_u64(8));
        volume.set_volume_values(1, 2, 0, OpticalProperties::new(6.0, 11.0, 0.8), SegmentationType::Vessel);
        volume.set_volume_values(4, 0, 2, OpticalProperties::new(1e-10, 1e-10, 1.0), SegmentationType::Air);
        volume.set_property("vessel_0.radius_in_voxels", 2.5);
        volume
    }

    #[test]
    fn export_contains_all_channels() {
        let image = sample_volume().to_channel_image();
        let names: Vec<&str> = image.channels.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["absorption", "anisotropy", "scattering", "segmentation"]);
        assert_eq!(image.spacing, 0.3);
        assert_eq!(image.channel("segmentation").unwrap()[[1, 2, 0]], 1.0);
        assert_eq!(image.channel("segmentation").unwrap()[[4, 0, 2]], -1.0);
        assert_eq!(
            image.properties.get("vessel_0.radius_in_voxels"),
            Some(&PropertyValue::Number(2.5))
        );
    }

    #[test]
    fn export_then_import_restores_volume_data() {
        let volume = sample_volume();
        let image = ChannelImage::from(&volume);
        let restored = TissueVolume::from_channel_image(&image, *volume.layering()).unwrap();

        for c in Coefficient::ALL {
            assert_eq!(restored.coefficient(c), volume.coefficient(c));
        }
        assert_eq!(restored.segmentation(), volume.segmentation());
        assert_eq!(restored.properties(), volume.properties());
        assert_eq!(restored.spacing(), volume.spacing());
    }

    #[test]
    fn import_reports_missing_channel() {
        let mut image = sample_volume().to_channel_image();
        image.channels.remove("scattering");
        let err = TissueVolume::from_channel_image(&image, Layering::none()).unwrap_err();
        assert_eq!(err, TissueError::MissingChannel("scattering".into()));
    }

    #[test]
    fn import_reports_unknown_label() {
        let mut image = sample_volume().to_channel_image();
        image.channels.get_mut(SEGMENTATION_CHANNEL).unwrap()[[0, 0, 0]] = 7.0;
        let err = TissueVolume::from_channel_image(&image, Layering::none()).unwrap_err();
        assert_eq!(err, TissueError::UnknownLabel(7.0));
    }

    #[test]
    fn import_reports_shape_mismatch() {
        let mut image = sample_volume().to_channel_image();
        image.channels.insert("anisotropy".into(), Array3::zeros((5, 4, 2)));
        let err = TissueVolume::from_channel_image(&image, Layering::none()).unwrap_err();
        assert!(matches!(err, TissueError::ShapeMismatch { .. }));
    }
}

//! Sphere-sweep voxelization of a vessel's traveled segment.

use crate::{
    config::OpticalProperties,
    types::Vector3,
    vessel::VesselSegmentState,
    volume::{SegmentationType, TissueVolume},
};

/// Burns the segment described by `state` into `volume`.
///
/// The travel vector is `state.direction / spacing` (voxels). Starting at
/// `state.position`, a sphere of `state.radius_in_voxels` is stamped at
/// every unit step while at least one voxel of travel remains. A stop
/// point outside the volume zeroes the radius and returns, which ends the
/// vessel. Otherwise the position moves to the final stop point.
pub fn draw(state: &mut VesselSegmentState, volume: &mut TissueVolume) {
    let travel = state.direction / volume.spacing();
    let length = travel.length();
    let step = if length > 0.0 { travel / length } else { Vector3::ZERO };

    let props = OpticalProperties::new(state.absorption, state.scattering, state.anisotropy);
    let mut point = state.position;
    let mut remaining = length;

    while remaining >= 1.0 {
        let voxel = point.round();
        if !volume.is_inside_volume(voxel.x as i64, voxel.y as i64, voxel.z as i64) {
            state.radius_in_voxels = 0.0;
            return;
        }

        stamp_sphere(volume, point, state.radius_in_voxels, props, state.partial_volume);

        point += step;
        remaining -= 1.0;
    }

    state.position = point;
}

/// Writes every voxel whose centre lies strictly within `radius` of `center`.
///
/// With `partial_volume`, voxels on the rim (`radius - 0.5 <= d < radius + 0.5`)
/// are blended by their coverage instead.
fn stamp_sphere(
    volume: &mut TissueVolume,
    center: Vector3,
    radius: f64,
    props: OpticalProperties,
    partial_volume: bool,
) {
    let reach = radius.ceil() + if partial_volume { 1.0 } else { 0.0 };
    let lo = (center - Vector3::splat(reach)).floor();
    let hi = (center + Vector3::splat(reach)).ceil();

    for x in lo.x as i64..=hi.x as i64 {
        for y in lo.y as i64..=hi.y as i64 {
            for z in lo.z as i64..=hi.z as i64 {
                if !volume.is_inside_volume(x, y, z) {
                    continue;
                }
                let d = center.distance(Vector3::new(x as f64, y as f64, z as f64));
                let (x, y, z) = (x as usize, y as usize, z as usize);

                if !partial_volume {
                    if d < radius {
                        volume.set_volume_values(x, y, z, props, SegmentationType::Vessel);
                    }
                    continue;
                }

                let coverage = (radius + 0.5 - d).clamp(0.0, 1.0);
                if coverage >= 1.0 {
                    volume.set_volume_values(x, y, z, props, SegmentationType::Vessel);
                } else if coverage > 0.0 {
                    blend_voxel(volume, [x, y, z], props, coverage);
                }
            }
        }
    }
}

fn blend_voxel(volume: &mut TissueVolume, [x, y, z]: [usize; 3], props: OpticalProperties, coverage: f64) {
    let (Some(old), Some(old_label)) = (
        volume.optical_properties_at(x, y, z),
        volume.segmentation_at(x, y, z),
    ) else {
        return;
    };

    let mix = |old: f64, new: f64| old * (1.0 - coverage) + new * coverage;
    let blended = OpticalProperties::new(
        mix(old.absorption, props.absorption),
        mix(old.scattering, props.scattering),
        mix(old.anisotropy, props.anisotropy),
    );
    let label = if coverage >= 0.5 {
        SegmentationType::Vessel
    } else {
        old_label
    };
    volume.set_volume_values(x, y, z, blended, label);
}

/// Position or direction in voxel (or physical) coordinates.
///
/// Plain `glam` value type: copies are deep, so two vessels never alias
/// the same position or direction.
pub type Vector3 = glam::DVec3;

/// Identifier for a vessel in a [`crate::tree::VesselTree`].
///
/// This is an index into `VesselTree::vessels`, and is only meaningful
/// within the lifetime of a given tree.
pub type VesselId = usize;

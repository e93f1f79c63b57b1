//! Synthetic tissue volumes with procedurally grown vascular networks.
//!
//! Main components:
//! - [`vector`] — randomization and spherical rotation of [`types::Vector3`].
//! - [`meander`] — policies that evolve a vessel's direction.
//! - [`vessel`] — one growing, bifurcating vessel and its segment state.
//! - [`tree`] — all vessels grown from one seed and the growth loop.
//! - [`rasterizer`] — sphere-sweep voxelization of vessel segments.
//! - [`volume`] — the voxel grid with coefficients, labels and layering.
//! - [`filters`] — threshold, multiply, log10, recursive Gaussian, rescale.
//! - [`generator`] — randomized and phantom generation runs.
//! - [`config`] — generator parameters.
//! - [`channels`] — export/import as named image channels.
//! - [`error`] — error type shared by fallible operations.
//! - [`types`] — shared type aliases and IDs.

pub mod channels;
pub mod config;
pub mod error;
pub mod filters;
pub mod generator;
pub mod meander;
pub mod rasterizer;
pub mod tree;
pub mod types;
pub mod vector;
pub mod vessel;
pub mod volume;

pub use config::{GeneratorConfig, OpticalProperties, ValueRange, VesselSettings, VolumeSettings};
pub use error::TissueError;
pub use generator::{generate_phantom, generate_tissue, generate_tissue_with_rng, seeded_rng};
pub use meander::MeanderStrategy;
pub use volume::{Coefficient, SegmentationType, TissueVolume};

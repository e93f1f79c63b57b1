use thiserror::Error;

/// Errors reported by the tissue core.
///
/// Geometric edge cases (vessels leaving the volume, out-of-bounds voxel
/// writes, zero directions) are handled locally and never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TissueError {
    #[error("cannot take log10 of negative value {value} at voxel {index:?}")]
    NegativeLogInput { index: [usize; 3], value: f64 },

    #[error("volume shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    #[error("image is missing channel '{0}'")]
    MissingChannel(String),

    #[error("unknown segmentation label {0}")]
    UnknownLabel(f64),

    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TissueError>;

//! Bulk transforms over whole volumes.
//!
//! The elementwise filters work on any mutable 3-D `f64` array, so they
//! apply equally to owned arrays and to [`TissueVolume::coefficient_mut`]
//! views.

use crate::{
    error::{Result, TissueError},
    volume::{Coefficient, TissueVolume},
};
use ndarray::{Array3, ArrayBase, ArrayView3, Axis, DataMut, Ix3};

/// Forward+backward passes per axis of the recursive Gaussian.
const BLUR_STEPS: usize = 4;

/// Binarizes in place: `1` where the value exceeds `threshold`, else `0`.
pub fn threshold_image<S: DataMut<Elem = f64>>(vol: &mut ArrayBase<S, Ix3>, threshold: f64) {
    vol.mapv_inplace(|v| if v > threshold { 1.0 } else { 0.0 });
}

pub fn multiply_image<S: DataMut<Elem = f64>>(vol: &mut ArrayBase<S, Ix3>, factor: f64) {
    vol.mapv_inplace(|v| v * factor);
}

/// Replaces every value by its base-10 logarithm.
///
/// Negative values indicate corrupted input and fail the whole call
/// before anything is modified.
pub fn log10_image<S: DataMut<Elem = f64>>(vol: &mut ArrayBase<S, Ix3>) -> Result<()> {
    if let Some(((x, y, z), &value)) = vol.indexed_iter().find(|(_, v)| **v < 0.0) {
        return Err(TissueError::NegativeLogInput {
            index: [x, y, z],
            value,
        });
    }
    vol.mapv_inplace(f64::log10);
    Ok(())
}

/// Coefficients of the recursive (Alvarez-Mazorra) Gaussian approximation.
#[derive(Clone, Copy, Debug)]
struct RecursiveGaussian {
    nu: f64,
    boundary_scale: f64,
    post_scale: f64,
}

impl RecursiveGaussian {
    fn new(sigma: f64) -> Self {
        let lambda = sigma * sigma / (2.0 * BLUR_STEPS as f64);
        // Rationalized root of lambda * (1 - nu)^2 = nu; the direct
        // (1 + 2l - sqrt(1 + 4l)) / 2l form cancels catastrophically for small sigma.
        let nu = 2.0 * lambda / (1.0 + 2.0 * lambda + (1.0 + 4.0 * lambda).sqrt());
        Self {
            nu,
            boundary_scale: 1.0 / (1.0 - nu),
            post_scale: (nu / lambda).powi(3 * BLUR_STEPS as i32),
        }
    }

    fn filter_lane<S: DataMut<Elem = f64>>(&self, lane: &mut ArrayBase<S, ndarray::Ix1>) {
        let n = lane.len();
        if n == 0 {
            return;
        }
        for _ in 0..BLUR_STEPS {
            lane[0] *= self.boundary_scale;
            for i in 1..n {
                let prev = lane[i - 1];
                lane[i] += self.nu * prev;
            }

            lane[n - 1] *= self.boundary_scale;
            for i in (1..n).rev() {
                let next = lane[i];
                lane[i - 1] += self.nu * next;
            }
        }
    }
}

/// Separable recursive Gaussian blur along all three axes, in place.
///
/// `sigma` is in voxels; `sigma <= 0` leaves the volume untouched.
/// Uniform volumes are preserved.
pub fn gaussian_blur_3d<S: DataMut<Elem = f64>>(vol: &mut ArrayBase<S, Ix3>, sigma: f64) {
    if !(sigma > 0.0) || vol.is_empty() {
        return;
    }

    let filter = RecursiveGaussian::new(sigma);
    for axis in 0..3 {
        for mut lane in vol.lanes_mut(Axis(axis)) {
            filter.filter_lane(&mut lane);
        }
    }
    vol.mapv_inplace(|v| v * filter.post_scale);
}

/// Resamples all four arrays to `round(dims * ratio)` voxels per axis.
///
/// Coefficients use Gaussian-weighted interpolation with a sigma of
/// `spacing / (2 ratio)`; labels take the nearest input voxel so they
/// never blur. The spacing becomes `spacing / ratio`.
pub fn rescale_image(volume: &mut TissueVolume, ratio: f64) -> Result<()> {
    if !(ratio > 0.0) || !ratio.is_finite() {
        return Err(TissueError::InvalidConfig(format!(
            "rescale ratio must be positive, got {ratio}"
        )));
    }
    if volume.dims().contains(&0) {
        return Err(TissueError::InvalidConfig(format!(
            "cannot rescale an empty volume of shape {:?}",
            volume.dims()
        )));
    }

    let new_dims = volume
        .dims()
        .map(|d| ((d as f64 * ratio).round() as usize).max(1));
    // spacing / (2 ratio), expressed in input voxels.
    let sigma = 1.0 / (2.0 * ratio);

    let [absorption, scattering, anisotropy] =
        Coefficient::ALL.map(|c| resample_gaussian(volume.coefficient(c), new_dims, ratio, sigma));

    let segmentation = volume.segmentation();
    let [ix, iy, iz] = axis_taps(volume.dims(), new_dims, ratio, 0.0);
    let segmentation = Array3::from_shape_fn((new_dims[0], new_dims[1], new_dims[2]), |(x, y, z)| {
        segmentation[[ix[x][0].0, iy[y][0].0, iz[z][0].0]]
    });

    let spacing = volume.spacing() / ratio;
    volume.replace_grid(absorption, scattering, anisotropy, segmentation, spacing);
    Ok(())
}

type Taps = Vec<(usize, f64)>;

/// Normalized interpolation weights of output sample `i` along one axis.
fn taps(i: usize, old_len: usize, ratio: f64, sigma: f64) -> Taps {
    let last = old_len.saturating_sub(1) as f64;
    let center = ((i as f64 + 0.5) / ratio - 0.5).clamp(0.0, last);
    let nearest = vec![(center.round() as usize, 1.0)];
    if sigma <= 0.0 {
        return nearest;
    }

    let reach = 3.0 * sigma;
    let lo = (center - reach).ceil().max(0.0) as usize;
    let hi = (center + reach).floor().min(last) as usize;
    let mut taps: Taps = (lo..=hi)
        .map(|j| {
            let d = j as f64 - center;
            (j, (-d * d / (2.0 * sigma * sigma)).exp())
        })
        .collect();

    let total: f64 = taps.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return nearest;
    }
    for (_, w) in &mut taps {
        *w /= total;
    }
    taps
}

fn axis_taps(old: [usize; 3], new: [usize; 3], ratio: f64, sigma: f64) -> [Vec<Taps>; 3] {
    [0, 1, 2].map(|a| (0..new[a]).map(|i| taps(i, old[a], ratio, sigma)).collect())
}

fn resample_gaussian(input: ArrayView3<'_, f64>, new_dims: [usize; 3], ratio: f64, sigma: f64) -> Array3<f64> {
    let old_dims = [input.len_of(Axis(0)), input.len_of(Axis(1)), input.len_of(Axis(2))];
    let weights = axis_taps(old_dims, new_dims, ratio, sigma);

    let mut current = input.to_owned();
    for (axis, axis_weights) in weights.iter().enumerate() {
        let mut shape = current.raw_dim();
        shape[axis] = new_dims[axis];
        let mut out = Array3::zeros(shape);

        for (src, mut dst) in current
            .lanes(Axis(axis))
            .into_iter()
            .zip(out.lanes_mut(Axis(axis)))
        {
            for (i, taps) in axis_weights.iter().enumerate() {
                dst[i] = taps.iter().map(|&(j, w)| w * src[j]).sum();
            }
        }
        current = out;
    }
    current
}

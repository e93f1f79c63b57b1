//! Randomization and spherical rotation helpers for [`Vector3`].

use crate::types::Vector3;
use rand::Rng;

/// Vector operations used by vessel growth on top of what `glam` provides.
///
/// `length()` and `normalize()` come from `glam` directly. Note that
/// `normalize()` on a zero vector yields NaN components; callers avoid it.
pub trait VectorExt: Sized {
    /// Uniform sample in `[-1, 1]^3`.
    fn random_unit_box(rng: &mut impl Rng) -> Self;

    /// Uniform sample in `[0, x_lim] x [0, y_lim] x [0, z_lim]`.
    fn random_up_to(x_lim: f64, y_lim: f64, z_lim: f64, rng: &mut impl Rng) -> Self;

    /// Uniform sample in the box spanned by `lo` and `hi`.
    fn random_in_box(lo: Self, hi: Self, rng: &mut impl Rng) -> Self;

    /// Adds `scale_factor * U(-percentage, percentage)` to each component
    /// independently.
    fn randomize_by_percentage(&mut self, percentage: f64, scale_factor: f64, rng: &mut impl Rng);

    /// Rotates by adding `theta_delta` to the polar angle and `phi_delta`
    /// to the azimuth, keeping the length.
    fn rotate_spherical(&mut self, theta_delta: f64, phi_delta: f64);
}

/// Uniform draw that tolerates a collapsed interval.
fn uniform(lo: f64, hi: f64, rng: &mut impl Rng) -> f64 {
    if hi > lo { rng.random_range(lo..=hi) } else { lo }
}

impl VectorExt for Vector3 {
    fn random_unit_box(rng: &mut impl Rng) -> Self {
        Self::random_in_box(Vector3::splat(-1.0), Vector3::splat(1.0), rng)
    }

    fn random_up_to(x_lim: f64, y_lim: f64, z_lim: f64, rng: &mut impl Rng) -> Self {
        Self::random_in_box(Vector3::ZERO, Vector3::new(x_lim, y_lim, z_lim), rng)
    }

    fn random_in_box(lo: Self, hi: Self, rng: &mut impl Rng) -> Self {
        let x = uniform(lo.x, hi.x, rng);
        let y = uniform(lo.y, hi.y, rng);
        let z = uniform(lo.z, hi.z, rng);
        Vector3::new(x, y, z)
    }

    fn randomize_by_percentage(&mut self, percentage: f64, scale_factor: f64, rng: &mut impl Rng) {
        let lo = -percentage.abs();
        let hi = percentage.abs();
        self.x += scale_factor * uniform(lo, hi, rng);
        self.y += scale_factor * uniform(lo, hi, rng);
        self.z += scale_factor * uniform(lo, hi, rng);
    }

    fn rotate_spherical(&mut self, theta_delta: f64, phi_delta: f64) {
        let r = self.length();
        if r == 0.0 || (theta_delta == 0.0 && phi_delta == 0.0) {
            return;
        }

        let theta = (self.z / r).acos() + theta_delta;
        let phi = self.y.atan2(self.x) + phi_delta;

        *self = Vector3::new(
            r * theta.sin() * phi.cos(),
            r * theta.sin() * phi.sin(),
            r * theta.cos(),
        );
    }
}

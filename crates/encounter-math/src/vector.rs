//! Direction, snapping and sampling helpers for [`DVec3`].

use std::f64::consts::TAU;

use glam::DVec3;
use rand::Rng;

/// Normalize `v`, returning [`DVec3::ZERO`] for zero-length or non-finite input.
///
/// Motion code chains several normalizations per tick; a single NaN would
/// poison the context state for the rest of the entity's life.
pub fn safe_normalize(v: DVec3) -> DVec3 {
    if !v.is_finite() {
        return DVec3::ZERO;
    }
    v.normalize_or_zero()
}

/// Integer cell coordinates of a point on a regular grid.
///
/// Used as a hashable stand-in for a snapped position, since `DVec3` is not
/// `Hash`/`Eq`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct GridCell {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl GridCell {
    /// World-space position of this cell's anchor on a grid of `snap` meters.
    pub fn to_position(self, snap: f64) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64) * snap
    }
}

/// Cell containing `v` on a grid of `snap` meters (nearest anchor).
///
/// A non-positive `snap` is treated as a 1 m grid.
pub fn grid_cell(v: DVec3, snap: f64) -> GridCell {
    let snap = if snap > 0.0 && snap.is_finite() { snap } else { 1.0 };
    let scaled = (v / snap).round();
    GridCell {
        x: scaled.x as i64,
        y: scaled.y as i64,
        z: scaled.z as i64,
    }
}

/// Snap `v` to the nearest point of a grid with `snap` meter spacing.
pub fn grid_snap(v: DVec3, snap: f64) -> DVec3 {
    let snap = if snap > 0.0 && snap.is_finite() { snap } else { 1.0 };
    grid_cell(v, snap).to_position(snap)
}

/// Linear interpolation between two scalars.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Uniformly distributed unit vector on the sphere.
pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> DVec3 {
    let z: f64 = rng.random_range(-1.0..=1.0);
    let phi: f64 = rng.random_range(0.0..TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    DVec3::new(r * phi.cos(), r * phi.sin(), z)
}

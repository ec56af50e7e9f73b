//! Orientation helpers. An entity's nose points along local [`FORWARD`].

use glam::{DQuat, DVec3};

use crate::vector::safe_normalize;

/// Local forward axis of every entity.
pub const FORWARD: DVec3 = DVec3::NEG_Z;

/// World-space forward direction for `rotation`.
pub fn forward(rotation: DQuat) -> DVec3 {
    safe_normalize(sanitize(rotation) * FORWARD)
}

/// Rotation that points [`FORWARD`] from `from` toward `to`.
///
/// Coincident points yield [`DQuat::IDENTITY`].
pub fn look_rotation(from: DVec3, to: DVec3) -> DQuat {
    let direction = safe_normalize(to - from);
    if direction == DVec3::ZERO {
        return DQuat::IDENTITY;
    }
    DQuat::from_rotation_arc(FORWARD, direction)
}

/// Spherically interpolate `current` toward `target` by `t`, clamped to `[0, 1]`.
pub fn slerp_towards(current: DQuat, target: DQuat, t: f64) -> DQuat {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    sanitize(current).slerp(sanitize(target), t).normalize()
}

fn sanitize(q: DQuat) -> DQuat {
    if !q.is_finite() || q.length_squared() < 1e-12 {
        DQuat::IDENTITY
    } else {
        q.normalize()
    }
}

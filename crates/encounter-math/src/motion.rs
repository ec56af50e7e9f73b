//! Velocity-limited integration used by NPC motion behaviors.

use glam::DVec3;

use crate::vector::safe_normalize;

/// Advance `start` toward `end` for one step of `dt` seconds.
///
/// `velocity` is updated in place: it gains `acceleration * dt` and is capped
/// at `max_speed` (m/s). Position integrates the average of the old and new
/// velocity, so a body starting at rest moves `½·a·dt²`. If the step would
/// carry the body past `end` it stops exactly on `end`.
///
/// Non-positive or non-finite `dt` leaves both position and velocity alone.
pub fn linear_interpolate_with_velocity(
    start: DVec3,
    end: DVec3,
    velocity: &mut DVec3,
    acceleration: DVec3,
    max_speed: f64,
    dt: f64,
) -> DVec3 {
    if !(dt.is_finite() && dt > 0.0) {
        return start;
    }

    let v0 = if velocity.is_finite() { *velocity } else { DVec3::ZERO };
    let acceleration = if acceleration.is_finite() {
        acceleration
    } else {
        DVec3::ZERO
    };
    let max_speed = if max_speed.is_finite() { max_speed.max(0.0) } else { 0.0 };

    let v1 = (v0 + acceleration * dt).clamp_length_max(max_speed);
    let displacement = (v0 + v1) * 0.5 * dt;
    *velocity = v1;

    let to_end = end - start;
    if to_end.dot(displacement) > 0.0 && displacement.length_squared() >= to_end.length_squared() {
        return end;
    }

    start + displacement
}

/// Limit the change from `previous` to `next` to at most `max_delta`.
///
/// Returns the (possibly rescaled) velocity and whether clamping happened.
pub fn clamp_velocity_change(previous: DVec3, next: DVec3, max_delta: f64) -> (DVec3, bool) {
    let max_delta = max_delta.max(0.0);
    let delta = next - previous;
    if delta.length() <= max_delta {
        return (next, false);
    }
    (previous + safe_normalize(delta) * max_delta, true)
}

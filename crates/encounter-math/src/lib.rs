//! f64 vector and quaternion helpers used by encounter placement and NPC motion.
//!
//! Everything here works on [`glam::DVec3`] / [`glam::DQuat`] because world
//! coordinates span hundreds of millions of meters and `f32` loses meter-level
//! precision long before that.

mod motion;
mod rotation;
mod units;
mod vector;

pub use glam::{DQuat, DVec3};
pub use motion::{clamp_velocity_change, linear_interpolate_with_velocity};
pub use rotation::{FORWARD, forward, look_rotation, slerp_towards};
pub use units::{GRAVITY_M_S2, METERS_PER_SU, kph_to_mps, mps_to_kph};
pub use vector::{GridCell, grid_cell, grid_snap, lerp, random_direction, safe_normalize};

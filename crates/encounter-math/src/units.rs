/// One SU (space unit) in meters.
pub const METERS_PER_SU: f64 = 200_000.0;

/// Standard gravity, used to turn acceleration ratings given in g into m/s².
pub const GRAVITY_M_S2: f64 = 9.81;

/// Convert km/h to m/s.
pub fn kph_to_mps(kph: f64) -> f64 {
    kph / 3.6
}

/// Convert m/s to km/h.
pub fn mps_to_kph(mps: f64) -> f64 {
    mps * 3.6
}

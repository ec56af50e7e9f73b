//! Encounter region lifecycle.
//!
//! [`RegionPoolManager`] keeps each configured [`RegionPool`] at its target
//! size and walks every region through load, activation and expiry.
//! [`RegionPoolLoop`] drives those phases on timers.

pub mod driver;
pub mod error;
pub mod manager;
pub mod pool;

pub use driver::RegionPoolLoop;
pub use error::RegionError;
pub use manager::{CleanupReport, EXPIRATION_EXTENSION, MAX_PLACEMENT_ATTEMPTS, RegionPoolManager, RegionServices};
pub use pool::{EncounterDefinition, RegionPool};

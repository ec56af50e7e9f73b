//! Region (sector) instances: grid-snapped encounter areas with a lifecycle.

use std::time::SystemTime;

use encounter_math::METERS_PER_SU;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::FactionId;

/// Grid resolution every region location is snapped to: 20 SU.
pub const SECTOR_GRID_SNAP: f64 = METERS_PER_SU * 20.0;

/// A placed encounter area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInstance {
    /// Unique id.
    pub id: Uuid,
    /// Location, snapped to [`SECTOR_GRID_SNAP`].
    pub location: DVec3,
    /// Owning faction.
    pub faction_id: FactionId,
    /// Pool tag used to count regions per pool.
    pub tag: String,
    /// When the region was generated.
    pub created_at: SystemTime,
    /// When the region becomes eligible for cleanup. Never before `created_at`.
    pub expires_at: SystemTime,
    /// Hard deadline after which the region is removed even if occupied.
    pub force_expires_at: Option<SystemTime>,
    /// Script executed once when the region is loaded.
    pub on_load_script: String,
    /// Script executed once when players first arrive.
    pub on_enter_script: String,
    /// On-load script has run successfully.
    pub loaded: bool,
    /// On-enter script has run successfully.
    pub started: bool,
}

impl RegionInstance {
    /// `true` once `now` has reached `expires_at`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// `true` once `now` has reached `force_expires_at`, if set.
    pub fn is_force_expired(&self, now: SystemTime) -> bool {
        self.force_expires_at.is_some_and(|at| now >= at)
    }

    /// Loaded but not yet started.
    pub fn is_pending_startup(&self) -> bool {
        self.loaded && !self.started
    }
}

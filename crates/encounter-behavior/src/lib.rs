//! Per-entity behavior scheduling.
//!
//! A [`BehaviorLoop`] runs at a fixed rate for one [`BehaviorCategory`],
//! refreshing its roster of entity handles and fanning out one isolated task
//! per entity each cycle. Each task fetches the entity's [`BehaviorContext`]
//! from the shared [`ContextCache`] and ticks the entity's configured
//! [`Behavior`]s against it.

pub mod alive_check;
pub mod behavior;
pub mod cache;
pub mod context;
pub mod follow_target;
pub mod scheduler;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use alive_check::AliveCheckBehavior;
pub use behavior::{
    Behavior, BehaviorCategory, BehaviorError, BehaviorKind, BehaviorServices, UnknownBehavior,
    build_behaviors,
};
pub use cache::{ContextCache, SharedContext};
pub use context::{BehaviorContext, PropertyValue};
pub use follow_target::FollowTargetBehavior;
pub use scheduler::{BehaviorLoop, LoopConfig};
pub use stats::{CycleSnapshot, CycleStats, SharedStats};

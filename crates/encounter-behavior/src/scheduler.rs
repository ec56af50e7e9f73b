//! Fixed-rate behavior loop for one behavior category.
//!
//! Each loop owns its timers: the frame timer drives [`BehaviorLoop::tick`],
//! and slower timers refresh the roster, poll the feature flag and sweep the
//! context cache. Loops for different categories run side by side and share
//! one [`ContextCache`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use encounter_config::{CacheConfig, SchedulerConfig};
use encounter_world::{EntityHandle, ServiceError};
use tokio::sync::{RwLock, watch};
use tokio::time::{MissedTickBehavior, interval, interval_at};

use crate::behavior::{
    BehaviorCategory, BehaviorError, BehaviorKind, BehaviorServices, build_behaviors,
};
use crate::cache::ContextCache;
use crate::context::BehaviorContext;
use crate::stats::{CycleStats, SharedStats};

/// Timing of one behavior loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub frame_interval: Duration,
    pub roster_refresh: Duration,
    pub feature_refresh: Duration,
    pub sweep_interval: Duration,
    /// Feature flag gating every cycle.
    pub feature_key: String,
    pub stats_window: usize,
}

impl LoopConfig {
    pub fn from_config(
        category: BehaviorCategory,
        scheduler: &SchedulerConfig,
        cache: &CacheConfig,
    ) -> Self {
        let fps = match category {
            BehaviorCategory::HighPriority => scheduler.high_priority_fps,
            BehaviorCategory::MovementPriority => scheduler.movement_fps,
        };
        Self {
            frame_interval: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            roster_refresh: Duration::from_millis(scheduler.roster_refresh_ms.max(1)),
            feature_refresh: Duration::from_millis(scheduler.feature_refresh_ms.max(1)),
            sweep_interval: Duration::from_secs(cache.sweep_interval_secs.max(1)),
            feature_key: scheduler.feature_key.clone(),
            stats_window: 100,
        }
    }
}

pub struct BehaviorLoop {
    category: BehaviorCategory,
    config: LoopConfig,
    services: BehaviorServices,
    contexts: Arc<ContextCache>,
    roster: RwLock<Arc<Vec<EntityHandle>>>,
    enabled: AtomicBool,
    stats: SharedStats,
}

impl BehaviorLoop {
    /// A loop that starts disabled with an empty roster.
    pub fn new(
        category: BehaviorCategory,
        config: LoopConfig,
        services: BehaviorServices,
        contexts: Arc<ContextCache>,
    ) -> Self {
        let stats = CycleStats::shared(config.stats_window);
        Self {
            category,
            config,
            services,
            contexts,
            roster: RwLock::new(Arc::new(Vec::new())),
            enabled: AtomicBool::new(false),
            stats,
        }
    }

    pub fn category(&self) -> BehaviorCategory {
        self.category
    }

    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Current roster snapshot.
    pub async fn roster(&self) -> Arc<Vec<EntityHandle>> {
        Arc::clone(&*self.roster.read().await)
    }

    /// Drive the loop until `shutdown` turns `true`. An in-flight cycle always
    /// finishes first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            category = %self.category,
            frame_ms = self.config.frame_interval.as_millis() as u64,
            "behavior loop starting"
        );

        self.refresh_feature_flag().await;
        if let Err(e) = self.refresh_roster().await {
            tracing::warn!(category = %self.category, error = %e, "initial roster refresh failed");
        }

        let start = tokio::time::Instant::now();
        let mut frame = interval(self.config.frame_interval);
        frame.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut roster = interval_at(start + self.config.roster_refresh, self.config.roster_refresh);
        let mut feature =
            interval_at(start + self.config.feature_refresh, self.config.feature_refresh);
        let mut sweep = interval_at(start + self.config.sweep_interval, self.config.sweep_interval);
        for timer in [&mut roster, &mut feature, &mut sweep] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        let mut last_cycle: Option<tokio::time::Instant> = None;

        while !*shutdown.borrow() {
            tokio::select! {
                now = frame.tick() => {
                    let delta = last_cycle.map_or(self.config.frame_interval, |last| now - last);
                    last_cycle = Some(now);
                    self.tick(delta).await;
                }
                _ = roster.tick() => {
                    if let Err(e) = self.refresh_roster().await {
                        tracing::warn!(category = %self.category, error = %e, "roster refresh failed");
                    }
                }
                _ = feature.tick() => self.refresh_feature_flag().await,
                _ = sweep.tick() => {
                    let evicted = self.contexts.sweep();
                    if evicted > 0 {
                        tracing::debug!(category = %self.category, evicted, "swept expired contexts");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(category = %self.category, "behavior loop stopped");
    }

    /// Replace the roster with the active handles that run a behavior of this
    /// loop's category.
    ///
    /// Cached contexts are left alone. Other loops sharing the cache may still
    /// list an entity this roster dropped, and a retired entity's dead context
    /// must outlive every roster that names it. The sweep timer drops contexts
    /// nobody ticks anymore.
    pub async fn refresh_roster(&self) -> Result<usize, ServiceError> {
        let handles = self.services.handles.find_active().await?;

        let category = self.category;
        let roster: Vec<EntityHandle> = handles
            .into_iter()
            .filter(|h| {
                BehaviorKind::parse_list(h.entity_id, &h.properties.behaviors)
                    .any(|kind| kind.category() == category)
            })
            .collect();
        let count = roster.len();

        *self.roster.write().await = Arc::new(roster);
        tracing::debug!(category = %self.category, count, "roster refreshed");
        Ok(count)
    }

    /// Re-read the gating flag. A failed read keeps the previous value.
    pub async fn refresh_feature_flag(&self) {
        match self
            .services
            .flags
            .get_enabled(&self.config.feature_key, false)
            .await
        {
            Ok(enabled) => {
                let was = self.enabled.swap(enabled, Ordering::Relaxed);
                if was != enabled {
                    tracing::info!(category = %self.category, enabled, "behavior loop toggled");
                }
            }
            Err(e) => {
                tracing::warn!(category = %self.category, error = %e, "feature flag read failed");
            }
        }
    }

    /// One cycle: tick every roster entry in its own task and wait for all of
    /// them. Returns the number of entities fanned out to.
    pub async fn tick(&self, delta: Duration) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        let roster = self.roster().await;
        let started = Instant::now();

        let tasks: Vec<_> = roster
            .iter()
            .map(|handle| {
                let task = tokio::spawn(tick_entity(
                    self.category,
                    handle.clone(),
                    delta,
                    self.services.clone(),
                    Arc::clone(&self.contexts),
                ));
                (handle.entity_id, task)
            })
            .collect();

        for (entity_id, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(entity = %entity_id, category = %self.category, error = %e, "entity tick failed");
                }
                Err(e) => {
                    tracing::error!(entity = %entity_id, category = %self.category, error = %e, "entity tick panicked");
                }
            }
        }

        let elapsed = started.elapsed();
        let slow = elapsed > self.config.frame_interval;
        if slow {
            tracing::warn!(
                category = %self.category,
                entities = roster.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "behavior cycle overran its frame"
            );
        }
        if let Ok(mut stats) = self.stats.lock() {
            stats.record(elapsed, roster.len(), slow);
        }

        roster.len()
    }
}

async fn tick_entity(
    category: BehaviorCategory,
    handle: EntityHandle,
    delta: Duration,
    services: BehaviorServices,
    contexts: Arc<ContextCache>,
) -> Result<(), BehaviorError> {
    let Some(definition) = handle.definition.as_ref() else {
        return Ok(());
    };

    let mut behaviors = build_behaviors(
        handle.entity_id,
        definition,
        &handle.properties.behaviors,
        category,
        &services,
    );
    if behaviors.is_empty() {
        return Ok(());
    }

    let shared = contexts.get_or_create(handle.entity_id, || BehaviorContext::for_handle(&handle));
    let mut context = shared.lock().await;
    context.delta_time = delta.as_secs_f64();

    for behavior in behaviors.iter_mut() {
        behavior.initialize(&mut context).await?;
    }
    for behavior in behaviors.iter_mut() {
        if context.is_active(behavior.kind()) {
            behavior.tick(&mut context).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, handle};
    use encounter_world::EntityId;
    use encounter_world::memory::{MemoryHandleStore, MemoryWorld, WorldEntity};
    use encounter_world::{BoxFuture, EntityInfo, EntityInfoService, HandleStore};
    use glam::DVec3;
    use std::sync::atomic::AtomicUsize;

    const FEATURE: &str = "ConstructBehaviorLoop";

    fn loop_config() -> LoopConfig {
        LoopConfig::from_config(
            BehaviorCategory::MovementPriority,
            &SchedulerConfig::default(),
            &CacheConfig::default(),
        )
    }

    fn pursuer(id: u64, target: u64) -> EntityHandle {
        let mut h = handle(id, &["alive-check", "follow-target"]);
        h.properties.target = Some(EntityId(target));
        h
    }

    async fn movement_loop(fixture: &Fixture) -> BehaviorLoop {
        fixture.flags.set(FEATURE, true).await;
        let behavior_loop = BehaviorLoop::new(
            BehaviorCategory::MovementPriority,
            loop_config(),
            fixture.services.clone(),
            Arc::new(ContextCache::new(Duration::from_secs(60))),
        );
        behavior_loop.refresh_feature_flag().await;
        behavior_loop
    }

    async fn spawn_pair(fixture: &Fixture, id: u64, target: u64) {
        fixture.world.insert(WorldEntity::npc(EntityId(id), DVec3::ZERO)).await;
        fixture
            .world
            .insert(WorldEntity::npc(EntityId(target), DVec3::new(5_000.0, 0.0, 0.0)))
            .await;
        fixture.handles.insert(pursuer(id, target)).await;
    }

    #[test]
    fn test_loop_config_from_settings() {
        let config = loop_config();
        assert_eq!(config.frame_interval, Duration::from_millis(50));
        assert_eq!(config.roster_refresh, Duration::from_secs(2));
        assert_eq!(config.feature_refresh, Duration::from_secs(10));
        assert_eq!(config.feature_key, FEATURE);
    }

    #[tokio::test]
    async fn test_disabled_feature_makes_cycle_a_noop() {
        let fixture = Fixture::new();
        spawn_pair(&fixture, 1, 100).await;
        let behavior_loop = movement_loop(&fixture).await;
        behavior_loop.refresh_roster().await.unwrap();

        fixture.flags.set(FEATURE, false).await;
        behavior_loop.refresh_feature_flag().await;

        assert_eq!(behavior_loop.tick(Duration::from_millis(50)).await, 0);
        assert!(fixture.world.updates().is_empty());
    }

    #[tokio::test]
    async fn test_flag_read_failure_keeps_previous_value() {
        let fixture = Fixture::new();
        let behavior_loop = movement_loop(&fixture).await;
        assert!(behavior_loop.is_enabled());

        fixture.flags.set_unavailable(true);
        behavior_loop.refresh_feature_flag().await;
        assert!(behavior_loop.is_enabled());
    }

    #[tokio::test]
    async fn test_roster_keeps_only_matching_category() {
        let fixture = Fixture::new();
        fixture.handles.insert(handle(1, &["alive-check"])).await;
        fixture.handles.insert(pursuer(2, 100)).await;
        fixture.handles.insert(handle(3, &["unknown"])).await;
        let behavior_loop = movement_loop(&fixture).await;

        assert_eq!(behavior_loop.refresh_roster().await.unwrap(), 1);
        let roster = behavior_loop.roster().await;
        assert_eq!(roster[0].entity_id, EntityId(2));
    }

    #[tokio::test]
    async fn test_roster_snapshot_is_replaced_whole() {
        let fixture = Fixture::new();
        fixture.handles.insert(pursuer(1, 100)).await;
        let behavior_loop = movement_loop(&fixture).await;
        behavior_loop.refresh_roster().await.unwrap();
        let before = behavior_loop.roster().await;

        fixture.handles.insert(pursuer(2, 100)).await;
        behavior_loop.refresh_roster().await.unwrap();

        assert_eq!(before.len(), 1, "old snapshot must stay intact");
        assert_eq!(behavior_loop.roster().await.len(), 2);
    }

    #[tokio::test]
    async fn test_tick_moves_every_roster_entity() {
        let fixture = Fixture::new();
        spawn_pair(&fixture, 1, 100).await;
        spawn_pair(&fixture, 2, 101).await;
        let behavior_loop = movement_loop(&fixture).await;
        behavior_loop.refresh_roster().await.unwrap();

        assert_eq!(behavior_loop.tick(Duration::from_millis(50)).await, 2);
        assert!(fixture.world.last_update(EntityId(1)).is_some());
        assert!(fixture.world.last_update(EntityId(2)).is_some());

        let stats = behavior_loop.stats();
        assert_eq!(stats.lock().unwrap().total_cycles(), 1);
    }

    #[tokio::test]
    async fn test_context_persists_across_ticks() {
        let fixture = Fixture::new();
        spawn_pair(&fixture, 1, 100).await;
        let behavior_loop = movement_loop(&fixture).await;
        behavior_loop.refresh_roster().await.unwrap();

        behavior_loop.tick(Duration::from_millis(50)).await;
        let first = fixture.world.last_update(EntityId(1)).unwrap();
        behavior_loop.tick(Duration::from_millis(50)).await;
        let second = fixture.world.last_update(EntityId(1)).unwrap();

        assert!(
            second.velocity.length() > first.velocity.length(),
            "velocity should keep building from the cached context"
        );
    }

    #[tokio::test]
    async fn test_handle_without_definition_is_skipped() {
        let fixture = Fixture::new();
        spawn_pair(&fixture, 1, 100).await;
        let mut bare = pursuer(1, 100);
        bare.definition = None;
        fixture.handles.insert(bare).await;
        let behavior_loop = movement_loop(&fixture).await;
        behavior_loop.refresh_roster().await.unwrap();

        behavior_loop.tick(Duration::from_millis(50)).await;
        assert!(fixture.world.updates().is_empty());
    }

    /// Entity info that panics for one entity.
    struct Exploding {
        inner: Arc<MemoryWorld>,
        bad: EntityId,
    }

    impl EntityInfoService for Exploding {
        fn get(&self, id: EntityId) -> BoxFuture<'_, Result<Option<EntityInfo>, ServiceError>> {
            Box::pin(async move {
                if id == self.bad {
                    panic!("simulated collaborator crash");
                }
                self.inner.get(id).await
            })
        }

        fn get_velocity(&self, id: EntityId) -> BoxFuture<'_, Result<(DVec3, DVec3), ServiceError>> {
            self.inner.get_velocity(id)
        }

        fn activate_shields(&self, id: EntityId) -> BoxFuture<'_, Result<(), ServiceError>> {
            self.inner.activate_shields(id)
        }
    }

    #[tokio::test]
    async fn test_failing_entity_does_not_affect_siblings() {
        let mut fixture = Fixture::new();
        fixture.services.entities = Arc::new(Exploding {
            inner: fixture.world.clone(),
            bad: EntityId(2),
        });
        spawn_pair(&fixture, 1, 100).await;
        spawn_pair(&fixture, 2, 101).await;
        spawn_pair(&fixture, 3, 102).await;
        fixture
            .world
            .modify(EntityId(3), |e| e.engine_power = f64::NAN)
            .await;
        let behavior_loop = movement_loop(&fixture).await;
        behavior_loop.refresh_roster().await.unwrap();

        assert_eq!(behavior_loop.tick(Duration::from_millis(50)).await, 3);

        assert!(fixture.world.last_update(EntityId(1)).is_some());
        assert!(fixture.world.last_update(EntityId(2)).is_none());
        assert!(fixture.world.last_update(EntityId(3)).is_some());
    }

    fn shared_loop(
        fixture: &Fixture,
        category: BehaviorCategory,
        contexts: &Arc<ContextCache>,
    ) -> BehaviorLoop {
        BehaviorLoop::new(
            category,
            LoopConfig::from_config(category, &SchedulerConfig::default(), &CacheConfig::default()),
            fixture.services.clone(),
            Arc::clone(contexts),
        )
    }

    #[tokio::test]
    async fn test_retired_entity_stays_still_in_lagging_loop() {
        let fixture = Fixture::new();
        spawn_pair(&fixture, 1, 100).await;
        fixture.flags.set(FEATURE, true).await;
        let contexts = Arc::new(ContextCache::new(Duration::from_secs(60)));
        let high = shared_loop(&fixture, BehaviorCategory::HighPriority, &contexts);
        let movement = shared_loop(&fixture, BehaviorCategory::MovementPriority, &contexts);
        for behavior_loop in [&high, &movement] {
            behavior_loop.refresh_feature_flag().await;
            behavior_loop.refresh_roster().await.unwrap();
        }

        movement.tick(Duration::from_millis(50)).await;
        assert!(fixture.world.last_update(EntityId(1)).is_some());

        fixture
            .world
            .modify(EntityId(1), |e| e.info.abandoned = true)
            .await;
        high.tick(Duration::from_millis(50)).await;
        high.refresh_roster().await.unwrap();
        assert_eq!(fixture.events.events().len(), 1);
        assert!(!fixture.handles.contains(EntityId(1)).await);

        // The movement roster still lists the entity until its own refresh.
        let updates_before = fixture.world.updates().len();
        assert_eq!(movement.tick(Duration::from_millis(50)).await, 1);
        assert_eq!(fixture.world.updates().len(), updates_before);

        let context = contexts.get(EntityId(1)).expect("context kept");
        assert!(!context.lock().await.alive);

        high.tick(Duration::from_millis(50)).await;
        assert_eq!(fixture.events.events().len(), 1, "destruction is announced once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_contexts_of_removed_handles() {
        let fixture = Fixture::new();
        spawn_pair(&fixture, 1, 100).await;
        let contexts = Arc::new(ContextCache::new(Duration::from_secs(60)));
        fixture.flags.set(FEATURE, true).await;
        let behavior_loop =
            shared_loop(&fixture, BehaviorCategory::MovementPriority, &contexts);
        behavior_loop.refresh_feature_flag().await;
        behavior_loop.refresh_roster().await.unwrap();
        behavior_loop.tick(Duration::from_millis(50)).await;

        fixture.handles.remove(EntityId(1)).await.unwrap();
        behavior_loop.refresh_roster().await.unwrap();
        assert!(contexts.get(EntityId(1)).is_some(), "refresh leaves contexts alone");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(contexts.sweep(), 1);
        assert!(contexts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let fixture = Fixture::new();
        spawn_pair(&fixture, 1, 100).await;
        fixture.flags.set(FEATURE, true).await;
        let behavior_loop = Arc::new(BehaviorLoop::new(
            BehaviorCategory::MovementPriority,
            loop_config(),
            fixture.services.clone(),
            Arc::new(ContextCache::new(Duration::from_secs(60))),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = {
            let behavior_loop = Arc::clone(&behavior_loop);
            tokio::spawn(async move { behavior_loop.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(520)).await;
        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();

        let cycles = behavior_loop.stats().lock().unwrap().total_cycles();
        assert!(cycles >= 10, "expected about 11 cycles at 20 fps, got {cycles}");
        assert!(fixture.world.updates().len() as u64 >= cycles - 1);
    }

    /// Handle store that counts roster reads.
    struct CountingHandles {
        inner: Arc<MemoryHandleStore>,
        reads: AtomicUsize,
    }

    impl HandleStore for CountingHandles {
        fn find_active(&self) -> BoxFuture<'_, Result<Vec<EntityHandle>, ServiceError>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.find_active()
        }

        fn remove(&self, id: EntityId) -> BoxFuture<'_, Result<(), ServiceError>> {
            self.inner.remove(id)
        }

        fn remove_in_region(&self, location: DVec3) -> BoxFuture<'_, Result<usize, ServiceError>> {
            self.inner.remove_in_region(location)
        }
    }

    /// Entity info that answers after five seconds.
    struct Sluggish(Arc<MemoryWorld>);

    impl EntityInfoService for Sluggish {
        fn get(&self, id: EntityId) -> BoxFuture<'_, Result<Option<EntityInfo>, ServiceError>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                self.0.get(id).await
            })
        }

        fn get_velocity(&self, id: EntityId) -> BoxFuture<'_, Result<(DVec3, DVec3), ServiceError>> {
            self.0.get_velocity(id)
        }

        fn activate_shields(&self, id: EntityId) -> BoxFuture<'_, Result<(), ServiceError>> {
            self.0.activate_shields(id)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_triggers_one_catch_up_refresh() {
        let mut fixture = Fixture::new();
        spawn_pair(&fixture, 1, 100).await;
        fixture.flags.set(FEATURE, true).await;
        let handles = Arc::new(CountingHandles {
            inner: fixture.handles.clone(),
            reads: AtomicUsize::new(0),
        });
        fixture.services.handles = handles.clone();
        fixture.services.entities = Arc::new(Sluggish(fixture.world.clone()));

        let config = LoopConfig {
            frame_interval: Duration::from_secs(10),
            roster_refresh: Duration::from_secs(2),
            feature_refresh: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            feature_key: FEATURE.to_string(),
            stats_window: 10,
        };
        let behavior_loop = Arc::new(BehaviorLoop::new(
            BehaviorCategory::MovementPriority,
            config,
            fixture.services.clone(),
            Arc::new(ContextCache::new(Duration::from_secs(60))),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = {
            let behavior_loop = Arc::clone(&behavior_loop);
            tokio::spawn(async move { behavior_loop.run(shutdown_rx).await })
        };

        // The first cycle blocks for 5 s and misses two roster periods.
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(
            handles.reads.load(Ordering::SeqCst),
            2,
            "initial read plus a single catch-up refresh"
        );

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
        assert!(fixture.world.last_update(EntityId(1)).is_some());
    }
}

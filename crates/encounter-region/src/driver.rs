//! Timer-driven region lifecycle.

use std::sync::Arc;
use std::time::Duration;

use encounter_config::RegionConfig;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, interval_at};

use crate::error::RegionError;
use crate::manager::RegionPoolManager;
use crate::pool::RegionPool;

pub struct RegionPoolLoop {
    manager: Arc<RegionPoolManager>,
    pools: Vec<RegionPool>,
    cycle_interval: Duration,
    cleanup_interval: Duration,
}

impl RegionPoolLoop {
    pub fn new(manager: Arc<RegionPoolManager>, config: &RegionConfig) -> Self {
        Self {
            manager,
            pools: config.pools.iter().map(RegionPool::from).collect(),
            cycle_interval: Duration::from_secs(config.cycle_interval_secs.max(1)),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
        }
    }

    pub fn manager(&self) -> &Arc<RegionPoolManager> {
        &self.manager
    }

    pub fn pools(&self) -> &[RegionPool] {
        &self.pools
    }

    /// Generation for every pool, then loading and activation. The first
    /// failing phase ends the cycle.
    pub async fn run_cycle(&self) -> Result<(), RegionError> {
        for pool in &self.pools {
            self.manager.generate(pool).await?;
        }
        self.manager.load_unloaded().await?;
        self.manager.activate_entered().await?;
        Ok(())
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            pools = self.pools.len(),
            cycle_secs = self.cycle_interval.as_secs(),
            cleanup_secs = self.cleanup_interval.as_secs(),
            "region pool loop starting"
        );

        let mut cycle = interval(self.cycle_interval);
        cycle.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup = interval_at(
            tokio::time::Instant::now() + self.cleanup_interval,
            self.cleanup_interval,
        );
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = cycle.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!(error = %e, "region cycle aborted");
                    }
                }
                _ = cleanup.tick() => {
                    match self.manager.execute_cleanup().await {
                        Ok(report) if report.deleted > 0 || report.extended > 0 => {
                            tracing::info!(
                                deleted = report.deleted,
                                extended = report.extended,
                                released = report.released_handles,
                                "region cleanup"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "region cleanup failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("region pool loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::RegionServices;
    use encounter_config::{EncounterConfig, RegionPoolConfig};
    use encounter_world::memory::{MemoryEventBus, MemoryHandleStore, MemoryRegionStore, MemoryWorld};
    use encounter_world::{RegionStore, ScriptError, ScriptRegistry};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config(on_load: &str) -> RegionConfig {
        RegionConfig {
            cycle_interval_secs: 5,
            cleanup_interval_secs: 30,
            pools: vec![RegionPoolConfig {
                tag: "X".into(),
                quantity: 2,
                encounters: vec![EncounterConfig {
                    on_load_script: on_load.into(),
                    ..EncounterConfig::default()
                }],
                ..RegionPoolConfig::default()
            }],
        }
    }

    fn setup(on_load: &str) -> (RegionPoolLoop, Arc<MemoryRegionStore>) {
        let regions = Arc::new(MemoryRegionStore::new());
        let world = Arc::new(MemoryWorld::new());
        let mut scripts = ScriptRegistry::new();
        scripts.register("ok", |_ctx| Box::pin(async { Ok(()) }));
        scripts.register("broken", |_ctx| {
            Box::pin(async {
                Err(ScriptError::Failed {
                    script: "broken".into(),
                    reason: "boom".into(),
                })
            })
        });
        let services = RegionServices {
            regions: regions.clone(),
            scripts: Arc::new(scripts),
            spatial: world.clone(),
            entities: world,
            handles: Arc::new(MemoryHandleStore::new()),
            events: Arc::new(MemoryEventBus::new()),
        };
        let manager = Arc::new(RegionPoolManager::with_rng(services, StdRng::seed_from_u64(1)));
        (RegionPoolLoop::new(manager, &config(on_load)), regions)
    }

    #[tokio::test]
    async fn test_cycle_generates_and_loads() {
        let (driver, regions) = setup("ok");
        driver.run_cycle().await.unwrap();

        let all = regions.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.loaded));
    }

    #[tokio::test]
    async fn test_failed_load_aborts_cycle_and_retries() {
        let (driver, regions) = setup("broken");
        assert!(driver.run_cycle().await.is_err());
        assert_eq!(regions.len().await, 2, "generation happened before the failure");

        assert!(driver.run_cycle().await.is_err());
        assert_eq!(regions.len().await, 2, "pool already full");
        assert_eq!(regions.find_unloaded().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (driver, regions) = setup("ok");
        let driver = Arc::new(driver);
        let (tx, rx) = watch::channel(false);
        let task = {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(regions.len().await, 2);
    }
}

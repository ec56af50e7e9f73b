//! Time-to-live cache of behavior contexts keyed by entity id.
//!
//! Expiry is sliding: every lookup pushes the deadline out by the TTL, so an
//! entity that keeps ticking keeps its context. Lookups of an expired entry
//! replace it with a fresh one; [`ContextCache::sweep`] drops expired entries
//! nobody asked for.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use encounter_world::EntityId;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::context::BehaviorContext;

/// A context handed to one entity's tick task at a time.
pub type SharedContext = Arc<Mutex<BehaviorContext>>;

struct CacheEntry {
    context: SharedContext,
    expires_at: Instant,
}

pub struct ContextCache {
    entries: DashMap<EntityId, CacheEntry>,
    ttl: Duration,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Context for `id`, creating it with `create` if absent or expired.
    ///
    /// Concurrent first lookups for the same id all receive the same instance.
    pub fn get_or_create<F>(&self, id: EntityId, create: F) -> SharedContext
    where
        F: FnOnce() -> BehaviorContext,
    {
        let now = Instant::now();
        let expires_at = now + self.ttl;

        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.expires_at <= now {
                    tracing::debug!(entity = %id, "behavior context expired, recreating");
                    entry.context = Arc::new(Mutex::new(create()));
                }
                entry.expires_at = expires_at;
                Arc::clone(&entry.context)
            }
            Entry::Vacant(vacant) => {
                let context = Arc::new(Mutex::new(create()));
                vacant.insert(CacheEntry {
                    context: Arc::clone(&context),
                    expires_at,
                });
                context
            }
        }
    }

    /// Live context for `id` without creating or refreshing it.
    pub fn get(&self, id: EntityId) -> Option<SharedContext> {
        let now = Instant::now();
        self.entries
            .get(&id)
            .filter(|e| e.expires_at > now)
            .map(|e| Arc::clone(&e.context))
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encounter_world::FactionId;
    use glam::DVec3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fresh() -> BehaviorContext {
        BehaviorContext::new(FactionId(1), None, DVec3::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_instance_within_ttl() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let a = cache.get_or_create(EntityId(1), fresh);
        a.lock().await.velocity = DVec3::X;

        tokio::time::advance(Duration::from_secs(30)).await;
        let b = cache.get_or_create(EntityId(1), fresh);

        assert!(Arc::ptr_eq(&a, &b), "lookup within TTL should reuse the context");
        assert_eq!(b.lock().await.velocity, DVec3::X);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_slides_on_access() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let a = cache.get_or_create(EntityId(1), fresh);
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(45)).await;
            cache.get_or_create(EntityId(1), fresh);
        }
        let b = cache.get_or_create(EntityId(1), fresh);
        assert!(Arc::ptr_eq(&a, &b), "regular access should keep the context alive");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_instance_after_expiry() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let a = cache.get_or_create(EntityId(1), fresh);
        a.lock().await.alive = false;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get(EntityId(1)).is_none());
        let b = cache.get_or_create(EntityId(1), fresh);

        assert!(!Arc::ptr_eq(&a, &b), "expired context should be replaced");
        assert!(b.lock().await.alive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_only_expired() {
        let cache = ContextCache::new(Duration::from_secs(60));
        cache.get_or_create(EntityId(1), fresh);
        tokio::time::advance(Duration::from_secs(40)).await;
        cache.get_or_create(EntityId(2), fresh);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(EntityId(1)).is_none());
        assert!(cache.get(EntityId(2)).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_creates_once() {
        let cache = Arc::new(ContextCache::new(Duration::from_secs(60)));
        let created = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let cache = Arc::clone(&cache);
            let created = Arc::clone(&created);
            tasks.push(tokio::spawn(async move {
                cache.get_or_create(EntityId(7), || {
                    created.fetch_add(1, Ordering::SeqCst);
                    fresh()
                })
            }));
        }

        let mut contexts = Vec::new();
        for task in tasks {
            contexts.push(task.await.unwrap());
        }

        assert_eq!(created.load(Ordering::SeqCst), 1, "context built more than once");
        assert!(contexts.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}

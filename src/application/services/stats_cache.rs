//! Short-TTL cache for assembled ad performance rows.
//!
//! Owned by the console service rather than living in a process-wide
//! singleton; the clock is injected so expiry is testable without
//! sleeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::entities::ad_performance::AdPerformanceRecord;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall-clock time; the production clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Cache hit/miss counters.
#[derive(Clone, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CachedRows {
    rows: Vec<AdPerformanceRecord>,
    cached_at: SystemTime,
}

/// TTL cache keyed by the stats query (range + scope).
pub struct StatsCache {
    entries: RwLock<HashMap<String, CachedRows>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    stats: RwLock<CacheStats>,
}

impl StatsCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        StatsCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    /// Fetch non-expired rows for `key`, counting the hit or miss.
    pub async fn get(&self, key: &str) -> Option<Vec<AdPerformanceRecord>> {
        let now = self.clock.now();
        let hit = {
            let entries = self.entries.read().await;
            entries.get(key).and_then(|cached| {
                let age = now.duration_since(cached.cached_at).unwrap_or(self.ttl);
                (age < self.ttl).then(|| cached.rows.clone())
            })
        };

        let mut stats = self.stats.write().await;
        match hit {
            Some(rows) => {
                stats.hits += 1;
                debug!(
                    key = %key,
                    rows = rows.len(),
                    hit_rate = format!("{:.2}%", stats.hit_rate()),
                    "stats cache hit"
                );
                Some(rows)
            }
            None => {
                stats.misses += 1;
                debug!(key = %key, "stats cache miss");
                None
            }
        }
    }

    pub async fn insert(&self, key: String, rows: Vec<AdPerformanceRecord>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CachedRows {
                rows,
                cached_at: self.clock.now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let cleared = entries.len();
        entries.clear();
        debug!(cleared_entries = cleared, "stats cache cleared");
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Clock that only moves when the test advances it.
    struct ManualClock {
        now: Mutex<SystemTime>,
    }

    impl ManualClock {
        fn new() -> Self {
            ManualClock {
                now: Mutex::new(SystemTime::UNIX_EPOCH),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            *self.now.lock().unwrap()
        }
    }

    fn row(ad_id: &str) -> AdPerformanceRecord {
        AdPerformanceRecord {
            ad_id: ad_id.to_string(),
            campaign_id: None,
            mall_product_id: None,
            bid_amt: None,
            cost: 0.0,
            conv_cnt: 0.0,
            conv_amt: 0.0,
            imp: 0.0,
            clk: 0.0,
            avg_rnk: None,
        }
    }

    #[tokio::test]
    async fn test_cache_miss_then_hit() {
        let cache = StatsCache::with_system_clock(Duration::from_secs(60));
        assert!(cache.get("k").await.is_none());

        cache.insert("k".to_string(), vec![row("a")]).await;
        let rows = cache.get("k").await.expect("cached rows");
        assert_eq!(rows.len(), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_cache_expires_with_injected_clock() {
        let clock = Arc::new(ManualClock::new());
        let cache = StatsCache::new(Duration::from_secs(30), clock.clone());

        cache.insert("k".to_string(), vec![row("a")]).await;
        assert!(cache.get("k").await.is_some());

        clock.advance(Duration::from_secs(31));
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_clear() {
        let cache = StatsCache::with_system_clock(Duration::from_secs(60));
        cache.insert("k".to_string(), vec![row("a")]).await;
        assert_eq!(cache.len().await, 1);
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }
}

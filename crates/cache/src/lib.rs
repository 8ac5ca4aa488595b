//! Read-through TTL cache for expensive reporting queries.
//!
//! The cache is an injected collaborator, not a process-global: each engine
//! instance owns its `QueryCache`, which keeps tests hermetic and lets
//! deployments size the cache per service. Entries are serialized
//! `serde_json` payloads keyed by query kind plus canonical parameters, with
//! a per-kind TTL and oldest-first eviction once a kind reaches its entry
//! bound.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use shopkeep_core::ProductId;
use tokio::time::Instant;
use tracing::debug;

/// Query families the cache distinguishes.
///
/// Low-stock listings change with every inventory write, so they get a
/// seconds-scale TTL; stockout forecasts are dominated by slow-moving sales
/// history and tolerate minutes of staleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    LowStock,
    StockForecast,
    Dashboard,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [
        CacheKind::LowStock,
        CacheKind::StockForecast,
        CacheKind::Dashboard,
    ];

    /// Kinds whose payloads aggregate over many products and cannot be
    /// invalidated per-product. Stockout forecasts scan every record, so a
    /// write to any product stales them.
    const AGGREGATE: [CacheKind; 3] = [
        CacheKind::LowStock,
        CacheKind::StockForecast,
        CacheKind::Dashboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::LowStock => "low_stock",
            CacheKind::StockForecast => "stock_forecast",
            CacheKind::Dashboard => "dashboard",
        }
    }
}

/// Per-kind TTLs and size bounds.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub low_stock_ttl: Duration,
    pub stock_forecast_ttl: Duration,
    pub dashboard_ttl: Duration,
    pub max_entries_per_kind: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            low_stock_ttl: Duration::from_secs(30),
            stock_forecast_ttl: Duration::from_secs(10 * 60),
            dashboard_ttl: Duration::from_secs(60),
            max_entries_per_kind: 512,
        }
    }
}

impl CacheConfig {
    pub fn with_low_stock_ttl(mut self, ttl: Duration) -> Self {
        self.low_stock_ttl = ttl;
        self
    }

    pub fn with_stock_forecast_ttl(mut self, ttl: Duration) -> Self {
        self.stock_forecast_ttl = ttl;
        self
    }

    pub fn with_dashboard_ttl(mut self, ttl: Duration) -> Self {
        self.dashboard_ttl = ttl;
        self
    }

    pub fn with_max_entries_per_kind(mut self, max: usize) -> Self {
        self.max_entries_per_kind = max.max(1);
        self
    }

    pub fn ttl_for(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::LowStock => self.low_stock_ttl,
            CacheKind::StockForecast => self.stock_forecast_ttl,
            CacheKind::Dashboard => self.dashboard_ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: CacheKind,
    params: String,
}

#[derive(Debug, Clone)]
struct Entry {
    payload: serde_json::Value,
    expires_at: Instant,
    inserted: u64,
}

/// In-memory read-through cache with per-kind TTLs.
#[derive(Debug)]
pub struct QueryCache {
    config: CacheConfig,
    entries: RwLock<HashMap<CacheKey, Entry>>,
    insert_seq: AtomicU64,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            insert_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Serve `kind(params)` from cache, falling back to `fetch` on a miss or
    /// an expired entry. Fresh results are stored with a full TTL.
    ///
    /// The cache is transparent to callers: entries that cannot be
    /// serialized or deserialized are bypassed rather than surfaced as
    /// errors, and a fetch error is never cached.
    pub async fn with_cache<P, T, E, F, Fut>(
        &self,
        kind: CacheKind,
        params: &P,
        fetch: F,
    ) -> Result<T, E>
    where
        P: Serialize,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = match serde_json::to_string(params) {
            Ok(params) => CacheKey { kind, params },
            Err(err) => {
                debug!(kind = kind.as_str(), error = %err, "uncacheable query params; bypassing cache");
                return fetch().await;
            }
        };

        if let Some(value) = self.lookup(&key) {
            return Ok(value);
        }

        let fetched = fetch().await?;
        self.store(key, &fetched);
        Ok(fetched)
    }

    /// Drop per-product entries referencing `product_id` and flush the
    /// aggregate kinds, whose payloads may include any product.
    pub fn invalidate_by_product(&self, product_id: ProductId) {
        let needle = product_id.to_string();
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        entries.retain(|key, _| {
            !CacheKind::AGGREGATE.contains(&key.kind) && !key.params.contains(&needle)
        });
    }

    pub fn invalidate_kind(&self, kind: CacheKind) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|key, _| key.kind != kind);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        match serde_json::from_value(entry.payload.clone()) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(kind = key.kind.as_str(), error = %err, "stale cache payload shape; treating as miss");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: CacheKey, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(kind = key.kind.as_str(), error = %err, "unserializable query result; not caching");
                return;
            }
        };
        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        // Evict oldest-inserted entries of this kind once it hits its bound.
        let kind = key.kind;
        while entries
            .keys()
            .filter(|existing| existing.kind == kind && **existing != key)
            .count()
            >= self.config.max_entries_per_kind
        {
            let oldest = entries
                .iter()
                .filter(|(existing, _)| existing.kind == kind)
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(existing, _)| existing.clone());
            match oldest {
                Some(oldest) => entries.remove(&oldest),
                None => break,
            };
        }

        entries.insert(
            key,
            Entry {
                payload,
                expires_at: Instant::now() + self.config.ttl_for(kind),
                inserted: self.insert_seq.fetch_add(1, Ordering::SeqCst),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn short_ttl_cache() -> QueryCache {
        QueryCache::new(
            CacheConfig::default()
                .with_low_stock_ttl(Duration::from_millis(100))
                .with_stock_forecast_ttl(Duration::from_millis(100)),
        )
    }

    async fn counted_fetch(cache: &QueryCache, kind: CacheKind, params: &str, calls: &AtomicU32) -> u32 {
        cache
            .with_cache(kind, &params, || async {
                Ok::<_, std::convert::Infallible>(calls.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn serves_cached_payload_within_ttl_and_refetches_after() {
        let cache = short_ttl_cache();
        let calls = AtomicU32::new(0);

        assert_eq!(counted_fetch(&cache, CacheKind::LowStock, "t=5", &calls).await, 1);
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(counted_fetch(&cache, CacheKind::LowStock, "t=5", &calls).await, 1);

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(counted_fetch(&cache, CacheKind::LowStock, "t=5", &calls).await, 2);
    }

    #[tokio::test]
    async fn distinct_params_are_distinct_entries() {
        let cache = short_ttl_cache();
        let calls = AtomicU32::new(0);

        counted_fetch(&cache, CacheKind::LowStock, "t=5", &calls).await;
        counted_fetch(&cache, CacheKind::LowStock, "t=10", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn evicts_oldest_entry_of_kind_at_capacity() {
        let cache = QueryCache::new(CacheConfig::default().with_max_entries_per_kind(2));
        let calls = AtomicU32::new(0);

        counted_fetch(&cache, CacheKind::StockForecast, "a", &calls).await;
        counted_fetch(&cache, CacheKind::StockForecast, "b", &calls).await;
        counted_fetch(&cache, CacheKind::StockForecast, "c", &calls).await;
        assert_eq!(cache.len(), 2);

        // "a" was evicted, "c" was not.
        counted_fetch(&cache, CacheKind::StockForecast, "c", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        counted_fetch(&cache, CacheKind::StockForecast, "a", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn product_invalidation_flushes_every_aggregate_kind() {
        let cache = QueryCache::new(CacheConfig::default());
        let calls = AtomicU32::new(0);

        counted_fetch(&cache, CacheKind::LowStock, "t=5", &calls).await;
        counted_fetch(&cache, CacheKind::StockForecast, "w=30", &calls).await;
        counted_fetch(&cache, CacheKind::Dashboard, "today", &calls).await;
        assert_eq!(cache.len(), 3);

        // Forecasts and listings scan all products; no entry keyed only by
        // its query parameters may survive a single product's write.
        cache.invalidate_by_product(ProductId::new());
        assert!(cache.is_empty());

        counted_fetch(&cache, CacheKind::StockForecast, "w=30", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_kind() {
        let cache = QueryCache::new(CacheConfig::default());
        let calls = AtomicU32::new(0);

        counted_fetch(&cache, CacheKind::LowStock, "t=5", &calls).await;
        counted_fetch(&cache, CacheKind::Dashboard, "today", &calls).await;
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}

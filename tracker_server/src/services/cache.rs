//! Ephemeral TTL cache for expensive external lookups.
//!
//! Purely a performance aid: a stale or missing entry costs one redundant
//! external call, never a wrong answer. The lock is never held across the
//! loader, so two concurrent misses may both hit the upstream service.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::models::SourceStageConfig;
use crate::services::bundle::BundleManifest;
use crate::services::sources::{CommitInfo, CompareResult};

#[derive(Debug)]
pub struct EphemeralCache<K, V> {
    name: &'static str,
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K, V> EphemeralCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration, max_entries: usize) -> Self {
        Self {
            name,
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => {
                crate::metrics::cache_lookup(self.name, true);
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                crate::metrics::cache_lookup(self.name, false);
                None
            }
            None => {
                crate::metrics::cache_lookup(self.name, false);
                None
            }
        }
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, (stored_at, _))| *stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, (Instant::now(), value));
    }

    /// Return the cached value or run `load`, caching only successes.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = load().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// The caches shared by the enrichment and correlation stages. Constructed
/// once and handed to the components that need it.
#[derive(Debug)]
pub struct TrackerCaches {
    pub commits: EphemeralCache<String, CommitInfo>,
    pub merged_prs: EphemeralCache<String, Option<u64>>,
    pub comparisons: EphemeralCache<(String, String), CompareResult>,
    pub source_stages: EphemeralCache<String, Option<SourceStageConfig>>,
    /// Pipeline names known to the pipeline service.
    pub pipelines: EphemeralCache<(), Vec<String>>,
    /// Parsed bundle manifests keyed by (bucket/key, version id); `None`
    /// records a malformed bundle.
    pub bundles: EphemeralCache<(String, String), Option<BundleManifest>>,
}

impl TrackerCaches {
    pub fn new(ttl: Duration) -> Self {
        Self {
            commits: EphemeralCache::new("commits", ttl, 2048),
            merged_prs: EphemeralCache::new("merged_prs", ttl, 2048),
            comparisons: EphemeralCache::new("comparisons", ttl, 256),
            source_stages: EphemeralCache::new("source_stages", ttl, 64),
            pipelines: EphemeralCache::new("pipelines", ttl, 1),
            // Object versions are immutable, so these can live longer.
            bundles: EphemeralCache::new("bundles", ttl * 12, 512),
        }
    }

    /// Drop expired entries from every cache. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.commits.purge_expired().await
            + self.merged_prs.purge_expired().await
            + self.comparisons.purge_expired().await
            + self.source_stages.purge_expired().await
            + self.pipelines.purge_expired().await
            + self.bundles.purge_expired().await
    }
}

//! Cache layer.
//!
//! A best-effort, non-authoritative cache in front of the embedding provider,
//! query results, tool searches and tier-1 working memory.
//!
//! ## Key derivation
//!
//! ```text
//! key = "{namespace}:{kind}:" + hex(SHA256(trim(part_1) 0x1f trim(part_2) ...))
//! ```
//!
//! Backend failures never fail a request: reads degrade to a miss and writes
//! are dropped, both logged at `warn`. Tier-1 writes use [`CacheLayer::try_set`]
//! because the cache is their only destination.
//!
//! ## Generations
//!
//! Every kind carries a counter that [`CacheLayer::invalidate`] and
//! [`CacheLayer::clear`] bump. A reader that computed a result from the stores
//! fills the cache with [`CacheLayer::set_json_if_current`], passing the
//! generation it saw before reading; a result that raced an invalidation is
//! never served.

use anyhow::Result;
use moka::sync::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Storage behind the cache layer.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove every key starting with `prefix`. Returns how many were removed.
    fn invalidate_prefix(&self, prefix: &str) -> Result<u64>;

    fn clear(&self) -> Result<()>;

    /// Number of live entries.
    fn len(&self) -> Result<u64>;
}

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process backend on `moka`, honouring a TTL per entry.
pub struct MokaBackend {
    cache: Cache<String, Entry>,
}

impl MokaBackend {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl CacheBackend for MokaBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).map(|e| e.value))
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.cache.insert(key.to_string(), Entry { value, ttl });
        Ok(())
    }

    fn invalidate_prefix(&self, prefix: &str) -> Result<u64> {
        let mut removed = 0;
        for (key, _) in self.cache.iter() {
            if key.starts_with(prefix) {
                self.cache.invalidate(key.as_str());
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        self.cache.run_pending_tasks();
        Ok(self.cache.iter().count() as u64)
    }
}

/// What a cached value holds; part of the key and of invalidation prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Embedding,
    Query,
    ToolSearch,
    Working,
}

impl CacheKind {
    const ALL: [CacheKind; 4] = [Self::Embedding, Self::Query, Self::ToolSearch, Self::Working];

    fn index(self) -> usize {
        match self {
            Self::Embedding => 0,
            Self::Query => 1,
            Self::ToolSearch => 2,
            Self::Working => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Query => "query",
            Self::ToolSearch => "tools",
            Self::Working => "working",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
}

pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    namespace: String,
    hits: AtomicU64,
    misses: AtomicU64,
    generations: [AtomicU64; 4],
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            generations: Default::default(),
        }
    }

    /// In-process cache from config.
    pub fn from_config(config: &crate::config::CacheConfig) -> Self {
        Self::new(
            Arc::new(MokaBackend::new(config.max_entries)),
            config.namespace.clone(),
        )
    }

    /// Deterministic key for `parts`. Surrounding whitespace is ignored.
    pub fn key(&self, kind: CacheKind, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([0x1f]);
            }
            hasher.update(part.trim().as_bytes());
        }
        format!(
            "{}:{}:{}",
            self.namespace,
            kind.as_str(),
            hex::encode(hasher.finalize())
        )
    }

    fn prefix(&self, kind: CacheKind) -> String {
        format!("{}:{}:", self.namespace, kind.as_str())
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Read-through lookup; backend errors count as a miss.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Lookup that surfaces backend errors. Still updates hit/miss counters.
    pub fn try_get(&self, key: &str) -> Result<Option<String>> {
        let result = self.backend.get(key);
        self.record(matches!(result, Ok(Some(_))));
        result
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached value is not valid JSON, ignoring");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Err(e) = self.backend.set(key, value, ttl) {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }

    pub fn try_set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.backend.set(key, value, ttl)
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw, ttl),
            Err(e) => tracing::warn!(key, error = %e, "cache value serialization failed"),
        }
    }

    /// Current generation of `kind`. Read it before computing a value that
    /// will be cached with [`set_json_if_current`](Self::set_json_if_current).
    pub fn generation(&self, kind: CacheKind) -> u64 {
        self.generations[kind.index()].load(Ordering::SeqCst)
    }

    /// [`set_json`](Self::set_json) unless `kind` was invalidated since
    /// `generation` was read. Returns whether the value was kept.
    pub fn set_json_if_current<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        kind: CacheKind,
        generation: u64,
    ) -> bool {
        if self.generation(kind) != generation {
            tracing::debug!(key, "result raced an invalidation, not cached");
            return false;
        }
        self.set_json(key, value, ttl);
        // an invalidation may have landed between the check and the write
        if self.generation(kind) != generation {
            if let Err(e) = self.backend.invalidate_prefix(key) {
                tracing::warn!(key, error = %e, "stale cache entry could not be dropped");
            }
            return false;
        }
        true
    }

    /// Drop every entry of one kind.
    pub fn invalidate(&self, kind: CacheKind) {
        self.generations[kind.index()].fetch_add(1, Ordering::SeqCst);
        match self.backend.invalidate_prefix(&self.prefix(kind)) {
            Ok(removed) => tracing::debug!(kind = kind.as_str(), removed, "cache invalidated"),
            Err(e) => tracing::warn!(kind = kind.as_str(), error = %e, "cache invalidation failed"),
        }
    }

    /// Empty the backend and reset counters. Returns `false` if the backend failed.
    pub fn clear(&self) -> bool {
        for kind in CacheKind::ALL {
            self.generations[kind.index()].fetch_add(1, Ordering::SeqCst);
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        match self.backend.clear() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "cache clear failed");
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.backend.len().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache size unavailable");
            0
        });
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size,
        }
    }

    pub fn ping(&self) -> Result<()> {
        self.backend.len().map(|_| ())
    }
}

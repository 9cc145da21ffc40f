//! Result caching around any [`Invoker`].
//!
//! Only read-only tools on an allow-list are cached. Entries expire after a
//! fixed TTL (checked lazily on read) and the least recently used entry is
//! evicted once the cache is full.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use petstore_core::{ClientConfig, InvocationResult};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::error::TransportError;
use crate::invoker::Invoker;

/// Read-only tools whose results may be cached.
pub const DEFAULT_CACHEABLE_TOOLS: &[&str] = &[
    "get_pet_by_id",
    "find_pets_by_status",
    "find_pets_by_tags",
    "get_inventory",
    "get_order_by_id",
    "get_user_by_name",
];

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheEntry {
    value: InvocationResult,
    inserted_at: Instant,
    last_used: u64,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
    stats: CacheStats,
}

/// TTL + LRU map of invocation results, safe to share between tasks.
pub struct ResultCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
            ttl,
            max_entries,
        }
    }

    /// Cache key for a call: hex SHA-256 of the tool name and the
    /// canonical (key-sorted) JSON of its arguments.
    pub fn key(tool: &str, arguments: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tool.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(arguments).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a fresh entry. Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<InvocationResult> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.tick += 1;
        let tick = state.tick;

        let expired = match state.entries.get_mut(key) {
            Some(entry) if entry.inserted_at.elapsed() >= self.ttl => true,
            Some(entry) => {
                entry.last_used = tick;
                let value = entry.value.clone();
                state.stats.hits += 1;
                return Some(value);
            }
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.stats.evictions += 1;
        }
        state.stats.misses += 1;
        None
    }

    /// Store a result, evicting the least recently used entry if full.
    pub fn insert(&self, key: String, value: InvocationResult) {
        if self.max_entries == 0 {
            return;
        }

        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                state.stats.evictions += 1;
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Number of stored entries, including ones that have expired but not
    /// yet been read.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Serialize with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for key in keys {
                    out.insert(key.clone(), sorted(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// Serves allow-listed tool calls from a [`ResultCache`].
///
/// Failed results and errors are never stored. Two concurrent misses for
/// the same key both call through; the later write wins.
pub struct Caching<I> {
    inner: I,
    cache: ResultCache,
    cacheable: HashSet<String>,
}

impl<I> Caching<I> {
    /// Cache the default read-only tools.
    pub fn new(inner: I, ttl: Duration, max_entries: usize) -> Self {
        Self::with_tools(inner, ttl, max_entries, DEFAULT_CACHEABLE_TOOLS.iter().copied())
    }

    /// Cache only the named tools.
    pub fn with_tools<T, S>(inner: I, ttl: Duration, max_entries: usize, tools: T) -> Self
    where
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            cache: ResultCache::new(ttl, max_entries),
            cacheable: tools.into_iter().map(Into::into).collect(),
        }
    }

    /// Cache settings from the client configuration.
    pub fn from_config(inner: I, config: &ClientConfig) -> Self {
        Self::new(inner, config.cache_ttl(), config.max_cache_size)
    }

    pub fn is_cacheable(&self, tool: &str) -> bool {
        self.cacheable.contains(tool)
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

#[async_trait]
impl<I: Invoker> Invoker for Caching<I> {
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<InvocationResult, TransportError> {
        if !self.is_cacheable(tool) {
            return self.inner.invoke(tool, arguments).await;
        }

        let key = ResultCache::key(tool, &arguments);
        if let Some(hit) = self.cache.get(&key) {
            debug!(tool = tool, "Cache hit");
            return Ok(hit);
        }

        let result = self.inner.invoke(tool, arguments).await?;
        if result.is_success() {
            self.cache.insert(key, result.clone());
        }
        Ok(result)
    }
}

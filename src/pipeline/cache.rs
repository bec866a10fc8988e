//! Content-addressed cache of backend contexts.
//!
//! Keys are `"<context type>:<structural fingerprint>"`. Payloads are shared
//! through `Arc`, so a node holding a context keeps it alive even after the
//! table entry was replaced or removed.
//!
//! At most one payload is live per key: lookups and inserts go through the
//! shard lock of the underlying map, and [`ContextCache::get_or_try_insert_with`]
//! holds that lock across lookup, production and insert.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::fingerprint::Fingerprint;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque per-node transform state, as produced by a context producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendContext {
    /// Context type tag, e.g. `"matrix"` or `"lut"`.
    pub kind: String,
    pub bytes: Vec<u8>,
}

impl BackendContext {
    pub fn new(kind: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub type SharedContext = Arc<BackendContext>;

/// Build the cache key for a context type and a structural fingerprint.
pub fn cache_key(kind: &str, fingerprint: Fingerprint) -> String {
    format!("{}:{}", kind, fingerprint)
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub replacements: u64,
}

#[derive(Default)]
pub struct ContextCache {
    entries: DashMap<String, SharedContext>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    replacements: AtomicU64,
}

static GLOBAL: Lazy<Arc<ContextCache>> = Lazy::new(|| Arc::new(ContextCache::new()));

/// The process-wide cache shared by every pipeline that does not bring its own.
pub fn global() -> Arc<ContextCache> {
    Arc::clone(&GLOBAL)
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<SharedContext> {
        let found = self.entries.get(key).map(|e| Arc::clone(e.value()));
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store `payload` under `key`, returning the payload it replaced.
    ///
    /// The replaced payload loses the table's reference; holders keep theirs.
    pub fn set(&self, key: impl Into<String>, payload: SharedContext) -> Option<SharedContext> {
        let old = self.entries.insert(key.into(), payload);
        self.inserts.fetch_add(1, Ordering::Relaxed);
        if old.is_some() {
            self.replacements.fetch_add(1, Ordering::Relaxed);
        }
        old
    }

    /// Look up `key`, producing and storing the payload on a miss.
    ///
    /// Returns the payload and whether it was a hit. `produce` runs under the
    /// key's shard lock and must not access this cache.
    pub fn get_or_try_insert_with<F>(
        &self,
        key: &str,
        produce: F,
    ) -> PipelineResult<(SharedContext, bool)>
    where
        F: FnOnce() -> PipelineResult<SharedContext>,
    {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok((Arc::clone(occupied.get()), true))
            }
            Entry::Vacant(vacant) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let payload = produce()?;
                vacant.insert(Arc::clone(&payload));
                self.inserts.fetch_add(1, Ordering::Relaxed);
                Ok((payload, false))
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<SharedContext> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
        }
    }
}

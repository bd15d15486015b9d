//! Process-wide cache of built callable caches

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use super::callable::CallableCache;
use crate::bridge::ForeignRegistry;
use crate::errors::Result;
use crate::introspection::CallableInfo;

/// Built-once, read-many cache keyed by callable identity.
///
/// Entries whose callable metadata has been dropped are purged on every miss.
///
/// Concurrent builds of the same callable are not serialized; the last insert
/// wins and both results are equivalent.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<usize, (Weak<CallableInfo>, Arc<CallableCache>)>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(info: &Arc<CallableInfo>) -> usize {
        Arc::as_ptr(info) as usize
    }

    /// Cached entry, if `info` is the callable it was built for
    pub fn get(&self, info: &Arc<CallableInfo>) -> Option<Arc<CallableCache>> {
        let entry = self.entries.get(&Self::key(info))?;
        let (owner, cache) = entry.value();
        match owner.upgrade() {
            Some(owner) if Arc::ptr_eq(&owner, info) => Some(Arc::clone(cache)),
            _ => None,
        }
    }

    pub fn get_or_build(
        &self,
        info: &Arc<CallableInfo>,
        foreign: &ForeignRegistry,
    ) -> Result<Arc<CallableCache>> {
        if let Some(cache) = self.get(info) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cache);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let purged = self.purge();
        if purged > 0 {
            trace!(event = "cache_purge", purged);
        }
        // Built without holding any map lock; callback signatures recurse
        let cache = Arc::new(CallableCache::build(info, foreign)?);
        trace!(event = "cache_insert", callable = %cache.name);
        self.entries
            .insert(Self::key(info), (Arc::downgrade(info), Arc::clone(&cache)));
        Ok(cache)
    }

    /// Drop entries whose callable metadata is gone
    pub fn purge(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (owner, _)| owner.strong_count() > 0);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

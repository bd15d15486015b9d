//! Process-wide runtime context
//!
//! Design: every registry the marshaling core consults lives here and is
//! created up front, so no cache can be built before its registries exist.
//! Components reach the runtime through an `Arc` passed into each call;
//! closures handed to native code keep only a weak back-reference.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::foreign::ForeignRegistry;
use super::types::TypeRegistry;
use super::wrapper::WrapperTable;
use crate::cache::{CacheStore, CallableCache};
use crate::config::RuntimeConfig;
use crate::errors::{MarshalError, Result};
use crate::host::{HostGuard, HostLock, HostValue};
use crate::introspection::{CallableInfo, MetadataSource, Repository};
use crate::native::NativeHeap;

static GLOBAL: Lazy<Arc<Runtime>> = Lazy::new(|| Runtime::new(RuntimeConfig::from_env()));

/// Snapshot of invocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokeStats {
    pub calls_made: u64,
    pub marshal_failures: u64,
    pub native_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub enum_warnings: u64,
}

#[derive(Debug, Default)]
struct Counters {
    calls_made: AtomicU64,
    marshal_failures: AtomicU64,
    native_failures: AtomicU64,
    enum_warnings: AtomicU64,
}

#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    heap: Arc<NativeHeap>,
    host_lock: HostLock,
    wrappers: Arc<WrapperTable>,
    types: TypeRegistry,
    foreign: ForeignRegistry,
    caches: CacheStore,
    repository: Repository,
    counters: Counters,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        info!(
            event = "runtime_init",
            release_host_lock = config.invoke.release_host_lock,
            warn_on_unknown_enum = config.invoke.warn_on_unknown_enum,
        );
        Arc::new(Self {
            config,
            heap: NativeHeap::new(),
            host_lock: HostLock::new(),
            wrappers: WrapperTable::new(),
            types: TypeRegistry::new(),
            foreign: ForeignRegistry::new(),
            caches: CacheStore::new(),
            repository: Repository::new(),
            counters: Counters::default(),
        })
    }

    /// Shared default runtime, configured from the environment
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn heap(&self) -> &Arc<NativeHeap> {
        &self.heap
    }

    pub fn host_lock(&self) -> &HostLock {
        &self.host_lock
    }

    pub fn wrappers(&self) -> &Arc<WrapperTable> {
        &self.wrappers
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn foreign(&self) -> &ForeignRegistry {
        &self.foreign
    }

    pub fn caches(&self) -> &CacheStore {
        &self.caches
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Cached signature for `info`, built on first use
    pub fn cache_for(&self, info: &Arc<CallableInfo>) -> Result<Arc<CallableCache>> {
        self.caches.get_or_build(info, &self.foreign)
    }

    /// Resolve `namespace.name` in the repository and invoke it
    pub fn call(
        self: &Arc<Self>,
        guard: &mut HostGuard<'_>,
        namespace: &str,
        name: &str,
        args: &[HostValue],
        kwargs: &[(&str, HostValue)],
    ) -> Result<HostValue> {
        let info = self.repository.find_callable(namespace, name).ok_or_else(|| {
            MarshalError::type_error(format!("module '{}' has no attribute '{}'", namespace, name))
        })?;
        crate::invoke::invoke(self, guard, &info, args, kwargs)
    }

    pub fn stats(&self) -> InvokeStats {
        InvokeStats {
            calls_made: self.counters.calls_made.load(Ordering::Relaxed),
            marshal_failures: self.counters.marshal_failures.load(Ordering::Relaxed),
            native_failures: self.counters.native_failures.load(Ordering::Relaxed),
            cache_hits: self.caches.hits(),
            cache_misses: self.caches.misses(),
            enum_warnings: self.counters.enum_warnings.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_call(&self) {
        self.counters.calls_made.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_marshal_failure(&self) {
        self.counters.marshal_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_native_failure(&self) {
        self.counters.native_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enum_warning(&self) {
        self.counters.enum_warnings.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.config.heap.report_leaks_on_drop && self.heap.live_count() > 0 {
            warn!(event = "runtime_leaks", live = self.heap.live_count());
            self.heap.report_leaks();
        }
    }
}

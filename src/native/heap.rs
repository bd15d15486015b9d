//! Native heap ledger
//!
//! Design: every native allocation is a handle into a shared ledger keyed by a
//! monotonically increasing id. Handles are cheap to clone (pointer copies);
//! dropping a handle never frees anything, only `free()` does. This makes leaks
//! and double frees observable instead of undefined.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace, warn};

/// What an allocation backs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocKind {
    String,
    Array,
    List,
    HashTable,
    Boxed,
    Object,
    Closure,
}

/// Snapshot of ledger counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: u64,
    pub frees: u64,
    pub double_frees: u64,
    pub live: usize,
}

#[derive(Default)]
pub struct NativeHeap {
    live: DashMap<u64, AllocKind>,
    next_id: AtomicU64,
    allocations: AtomicU64,
    frees: AtomicU64,
    double_frees: AtomicU64,
}

impl NativeHeap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        })
    }

    /// Register a new live allocation
    pub fn alloc(self: &Arc<Self>, kind: AllocKind) -> Allocation {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.insert(id, kind);
        self.allocations.fetch_add(1, Ordering::Relaxed);
        trace!(event = "native_alloc", id, kind = ?kind);

        Allocation {
            inner: Arc::new(AllocInner {
                id,
                kind,
                freed: AtomicBool::new(false),
                heap: Arc::clone(self),
            }),
        }
    }

    /// Number of allocations not yet freed
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Live allocations of one kind
    pub fn live_of(&self, kind: AllocKind) -> usize {
        self.live.iter().filter(|e| *e.value() == kind).count()
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.live.contains_key(&id)
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            double_frees: self.double_frees.load(Ordering::Relaxed),
            live: self.live.len(),
        }
    }

    /// Log every allocation still live
    pub fn report_leaks(&self) {
        for entry in self.live.iter() {
            warn!(event = "native_leak", id = *entry.key(), kind = ?entry.value());
        }
    }

    fn release(&self, id: u64, kind: AllocKind) {
        self.live.remove(&id);
        self.frees.fetch_add(1, Ordering::Relaxed);
        trace!(event = "native_free", id, kind = ?kind);
    }
}

impl fmt::Debug for NativeHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHeap").field("stats", &self.stats()).finish()
    }
}

struct AllocInner {
    id: u64,
    kind: AllocKind,
    freed: AtomicBool,
    heap: Arc<NativeHeap>,
}

/// Handle to one native allocation
#[derive(Clone)]
pub struct Allocation {
    inner: Arc<AllocInner>,
}

impl Allocation {
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    pub fn kind(&self) -> AllocKind {
        self.inner.kind
    }

    pub fn heap(&self) -> &Arc<NativeHeap> {
        &self.inner.heap
    }

    pub fn is_live(&self) -> bool {
        !self.inner.freed.load(Ordering::Acquire)
    }

    /// Release the allocation. Returns false (and records it) on a double free.
    pub fn free(&self) -> bool {
        if self.inner.freed.swap(true, Ordering::AcqRel) {
            self.inner.heap.double_frees.fetch_add(1, Ordering::Relaxed);
            error!(event = "double_free", id = self.inner.id, kind = ?self.inner.kind);
            return false;
        }
        self.inner.heap.release(self.inner.id, self.inner.kind);
        true
    }
}

impl PartialEq for Allocation {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Allocation {}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.inner.kind, self.inner.id)?;
        if !self.is_live() {
            f.write_str(" (freed)")?;
        }
        Ok(())
    }
}

//! Boxed (structured) native instances and their copy/free vtables

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::trace;

use super::heap::{AllocKind, Allocation, NativeHeap};
use super::value::NativeValue;

pub type NativeBoxed = Arc<BoxedInstance>;

type CopyFn = Arc<dyn Fn(&NativeBoxed) -> NativeBoxed + Send + Sync>;
type FreeFn = Arc<dyn Fn(&NativeBoxed) + Send + Sync>;

/// Copy and free hooks for one boxed type
#[derive(Clone)]
pub struct BoxedVTable {
    copy: CopyFn,
    free: FreeFn,
}

impl BoxedVTable {
    pub fn new(
        copy: impl Fn(&NativeBoxed) -> NativeBoxed + Send + Sync + 'static,
        free: impl Fn(&NativeBoxed) + Send + Sync + 'static,
    ) -> Self {
        Self {
            copy: Arc::new(copy),
            free: Arc::new(free),
        }
    }

    /// Copy allocates a new instance with the same fields; free releases it
    pub fn plain() -> Self {
        Self::new(
            |boxed| {
                let heap = boxed.alloc().heap();
                BoxedInstance::with_fields(heap, boxed.type_name(), boxed.vtable().clone(), boxed.fields())
            },
            |boxed| {
                boxed.alloc().free();
            },
        )
    }

    /// Copy takes a reference; free drops one and releases at zero
    pub fn refcounted() -> Self {
        Self::new(
            |boxed| {
                boxed.acquire();
                Arc::clone(boxed)
            },
            |boxed| {
                if boxed.release_ref() {
                    boxed.alloc().free();
                }
            },
        )
    }
}

impl fmt::Debug for BoxedVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedVTable")
    }
}

pub struct BoxedInstance {
    type_name: String,
    alloc: Allocation,
    vtable: BoxedVTable,
    fields: Mutex<BTreeMap<String, NativeValue>>,
    refs: AtomicU32,
}

impl BoxedInstance {
    pub fn new(heap: &Arc<NativeHeap>, type_name: &str, vtable: BoxedVTable) -> NativeBoxed {
        Self::with_fields(heap, type_name, vtable, BTreeMap::new())
    }

    pub fn with_fields(
        heap: &Arc<NativeHeap>,
        type_name: &str,
        vtable: BoxedVTable,
        fields: BTreeMap<String, NativeValue>,
    ) -> NativeBoxed {
        let boxed = Arc::new(Self {
            type_name: type_name.to_string(),
            alloc: heap.alloc(AllocKind::Boxed),
            vtable,
            fields: Mutex::new(fields),
            refs: AtomicU32::new(1),
        });
        trace!(event = "boxed_new", type_name, id = boxed.alloc.id());
        boxed
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn alloc(&self) -> &Allocation {
        &self.alloc
    }

    pub fn vtable(&self) -> &BoxedVTable {
        &self.vtable
    }

    pub fn get(&self, field: &str) -> Option<NativeValue> {
        self.fields.lock().get(field).cloned()
    }

    pub fn set(&self, field: &str, value: NativeValue) {
        self.fields.lock().insert(field.to_string(), value);
    }

    pub fn fields(&self) -> BTreeMap<String, NativeValue> {
        self.fields.lock().clone()
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    pub fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one reference; true when it was the last
    pub fn release_ref(&self) -> bool {
        self.refs.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Type-specific copy
    pub fn copy(self: &Arc<Self>) -> NativeBoxed {
        (self.vtable.copy)(self)
    }

    /// Type-specific free
    pub fn free(self: &Arc<Self>) {
        (self.vtable.free)(self)
    }
}

impl fmt::Debug for BoxedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedInstance")
            .field("type_name", &self.type_name)
            .field("alloc", &self.alloc)
            .field("refs", &self.ref_count())
            .finish()
    }
}

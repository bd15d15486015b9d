//! Reference-counted native objects
//!
//! Design: mirrors a classic native object model:
//! - A plain reference count; the object finalizes when it reaches zero
//! - Floating references, claimed once by `ref_sink`
//! - At most one toggle reference, notified on 1 <-> 2 count transitions
//! - Weak notifications fired at finalization

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::heap::{AllocKind, Allocation, NativeHeap};
use crate::introspection::ObjectInfo;

/// Native identity; stable for the object's lifetime
pub type ObjectId = u64;

pub type NativeObjectRef = Arc<NativeObject>;

/// Called with `true` when the toggle reference became the last one
pub type ToggleNotify = Arc<dyn Fn(ObjectId, bool) + Send + Sync>;

/// Called once when the object finalizes
pub type WeakNotify = Arc<dyn Fn(ObjectId) + Send + Sync>;

pub struct NativeObject {
    class: Arc<ObjectInfo>,
    alloc: Allocation,
    ref_count: AtomicU32,
    floating: AtomicBool,
    finalized: AtomicBool,
    toggle: Mutex<Option<ToggleNotify>>,
    weak_notifies: Mutex<Vec<WeakNotify>>,
}

impl NativeObject {
    /// New object holding one reference, optionally floating
    pub fn new(heap: &Arc<NativeHeap>, class: Arc<ObjectInfo>, floating: bool) -> NativeObjectRef {
        let obj = Arc::new(Self {
            class,
            alloc: heap.alloc(AllocKind::Object),
            ref_count: AtomicU32::new(1),
            floating: AtomicBool::new(floating),
            finalized: AtomicBool::new(false),
            toggle: Mutex::new(None),
            weak_notifies: Mutex::new(Vec::new()),
        });
        trace!(event = "object_new", id = obj.id(), class = %obj.class.full_name(), floating);
        obj
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.alloc.id()
    }

    pub fn class(&self) -> &Arc<ObjectInfo> {
        &self.class
    }

    pub fn alloc(&self) -> &Allocation {
        &self.alloc
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn is_floating(&self) -> bool {
        self.floating.load(Ordering::Acquire)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    pub fn is_a(&self, info: &ObjectInfo) -> bool {
        self.class.is_a(info)
    }

    fn toggle_notify(&self) -> Option<ToggleNotify> {
        self.toggle.lock().clone()
    }

    /// Take a reference
    pub fn acquire(&self) {
        let old = self.ref_count.fetch_add(1, Ordering::AcqRel);
        trace!(event = "object_ref", id = self.id(), count = old + 1);
        if old == 1 {
            if let Some(notify) = self.toggle_notify() {
                notify(self.id(), false);
            }
        }
    }

    /// Drop a reference, finalizing at zero
    pub fn release(&self) {
        let old = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        trace!(event = "object_unref", id = self.id(), count = old.saturating_sub(1));
        match old {
            0 => {
                // Count was already zero; undo and record the misuse on the ledger
                self.ref_count.store(0, Ordering::Release);
                self.alloc.free();
            }
            1 => self.finalize(),
            2 => {
                if let Some(notify) = self.toggle_notify() {
                    notify(self.id(), true);
                }
            }
            _ => {}
        }
    }

    /// Claim a floating reference, or take a new one if not floating
    pub fn ref_sink(&self) {
        if !self.floating.swap(false, Ordering::AcqRel) {
            self.acquire();
        }
    }

    /// Take a reference and install the toggle notification
    pub fn add_toggle_ref(&self, notify: ToggleNotify) {
        self.acquire();
        *self.toggle.lock() = Some(notify);
        debug!(event = "toggle_ref_added", id = self.id(), count = self.ref_count());
    }

    /// Remove the toggle notification and drop its reference
    pub fn remove_toggle_ref(&self) {
        self.toggle.lock().take();
        self.release();
    }

    pub fn has_toggle_ref(&self) -> bool {
        self.toggle.lock().is_some()
    }

    /// Register a notification fired when the object finalizes
    pub fn weak_ref(&self, notify: WeakNotify) {
        if self.is_finalized() {
            notify(self.id());
            return;
        }
        self.weak_notifies.lock().push(notify);
    }

    fn finalize(&self) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(event = "object_finalize", id = self.id(), class = %self.class.full_name());
        self.toggle.lock().take();
        let notifies = std::mem::take(&mut *self.weak_notifies.lock());
        for notify in notifies {
            notify(self.id());
        }
        self.alloc.free();
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("class", &self.class.full_name())
            .field("id", &self.id())
            .field("ref_count", &self.ref_count())
            .field("floating", &self.is_floating())
            .finish()
    }
}

//! Weak references to wrapped native objects

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::wrapper::{HostObject, WrapperTable};
use crate::introspection::Transfer;
use crate::native::{NativeObjectRef, ObjectId};

/// Does not keep the native object alive. Finalization is observed through a
/// native weak-ref notification.
pub struct WeakWrapper {
    native: NativeObjectRef,
    table: Weak<WrapperTable>,
    alive: Arc<AtomicBool>,
}

impl WeakWrapper {
    pub(crate) fn new(native: &NativeObjectRef, table: Weak<WrapperTable>) -> Self {
        let alive = Arc::new(AtomicBool::new(!native.is_finalized()));
        let flag = Arc::clone(&alive);
        native.weak_ref(Arc::new(move |_| flag.store(false, Ordering::Release)));
        Self {
            native: Arc::clone(native),
            table,
            alive,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.native.id()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// The object's wrapper (re-created if needed), or `None` once finalized
    pub fn upgrade(&self) -> Option<Arc<HostObject>> {
        if !self.is_alive() {
            return None;
        }
        let table = self.table.upgrade()?;
        Some(table.wrap(&self.native, Transfer::Nothing))
    }
}

impl fmt::Debug for WeakWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakWrapper")
            .field("id", &self.id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

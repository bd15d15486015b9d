//! Native object <-> host wrapper table and toggle-reference ownership
//!
//! Design: each native object has at most one live `HostObject`. The table
//! keeps a weak pointer to it, plus a strong one while native code holds
//! references beyond the wrapper's own toggle reference.
//!
//! Ownership per wrapper is an explicit state machine:
//! - `HostOwned`: the wrapper holds a plain native reference
//! - `SharedToggle`: a toggle reference is installed and it is the last one,
//!   so the host side keeps the native object alive
//! - `NativeOwned`: a toggle reference is installed and other native
//!   references exist, so the table keeps the wrapper alive
//!
//! `HostOwned -> SharedToggle` happens once, by compare-and-swap, the first
//! time the wrapper acquires host-side state. Toggle notifications then move
//! between `SharedToggle` and `NativeOwned`.
//!
//! Native reference operations can re-enter the table through toggle
//! notifications, so they always run outside map entry guards, and wrapper
//! `Arc`s are dropped outside guards as well.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use super::closure::ClosureCell;
use super::weak::WeakWrapper;
use crate::host::HostValue;
use crate::introspection::Transfer;
use crate::native::{NativeObjectRef, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OwnershipState {
    HostOwned = 0,
    SharedToggle = 1,
    NativeOwned = 2,
}

impl OwnershipState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::SharedToggle,
            2 => Self::NativeOwned,
            _ => Self::HostOwned,
        }
    }
}

struct TableEntry {
    serial: u64,
    weak: Weak<HostObject>,
    /// Held while native code keeps the object (and so the wrapper) alive
    strong: Option<Arc<HostObject>>,
}

#[derive(Default)]
pub struct WrapperTable {
    entries: DashMap<ObjectId, TableEntry>,
    next_serial: AtomicU64,
}

impl WrapperTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Existing live wrapper for `id`
    pub fn lookup(&self, id: ObjectId) -> Option<Arc<HostObject>> {
        self.entries.get(&id).and_then(|e| e.weak.upgrade())
    }

    /// Return the wrapper for `obj`, creating it if needed.
    ///
    /// With `Transfer::Everything` the caller's reference is handed over: a
    /// new wrapper adopts it, an existing wrapper (which already holds its own)
    /// releases it. With `Transfer::Nothing` a new wrapper takes a reference.
    pub fn wrap(self: &Arc<Self>, obj: &NativeObjectRef, transfer: Transfer) -> Arc<HostObject> {
        let id = obj.id();
        let mut created = false;
        let wrapper = match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => match occupied.get().weak.upgrade() {
                Some(existing) => existing,
                None => {
                    // Previous wrapper is mid-teardown; its forget() checks the serial
                    let wrapper = self.new_wrapper(obj);
                    occupied.insert(self.entry_for(&wrapper));
                    created = true;
                    wrapper
                }
            },
            Entry::Vacant(vacant) => {
                let wrapper = self.new_wrapper(obj);
                vacant.insert(self.entry_for(&wrapper));
                created = true;
                wrapper
            }
        };

        match (created, transfer) {
            (true, Transfer::Everything) => {
                if obj.is_floating() {
                    obj.ref_sink();
                }
            }
            (true, _) => obj.ref_sink(),
            (false, Transfer::Everything) => obj.release(),
            (false, _) => {}
        }
        trace!(event = "wrap", id, created, transfer = ?transfer);
        wrapper
    }

    fn new_wrapper(self: &Arc<Self>, obj: &NativeObjectRef) -> Arc<HostObject> {
        Arc::new(HostObject {
            native: Arc::clone(obj),
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
            table: Arc::downgrade(self),
            state: AtomicU8::new(OwnershipState::HostOwned as u8),
            attrs: Mutex::new(BTreeMap::new()),
            closures: Mutex::new(Vec::new()),
        })
    }

    fn entry_for(&self, wrapper: &Arc<HostObject>) -> TableEntry {
        TableEntry {
            serial: wrapper.serial,
            weak: Arc::downgrade(wrapper),
            strong: None,
        }
    }

    /// Toggle notification: `is_last` means only the wrapper's reference remains
    pub(crate) fn on_toggle(&self, id: ObjectId, is_last: bool) {
        let released = {
            let Some(mut entry) = self.entries.get_mut(&id) else {
                return;
            };
            let Some(wrapper) = entry.weak.upgrade() else {
                return;
            };
            if is_last {
                wrapper.set_state(OwnershipState::SharedToggle);
                entry.strong.take().into_iter().chain(Some(wrapper)).collect::<Vec<_>>()
            } else {
                wrapper.set_state(OwnershipState::NativeOwned);
                entry.strong.replace(wrapper).into_iter().collect()
            }
        };
        debug!(event = "toggle", id, is_last);
        drop(released);
    }

    /// Remove the entry for `id` if it still belongs to wrapper `serial`
    fn forget(&self, id: ObjectId, serial: u64) {
        let removed = self.entries.remove_if(&id, |_, e| e.serial == serial);
        drop(removed);
    }

    /// Number of native objects that currently have a wrapper entry
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True while the table itself keeps the wrapper for `id` alive
    pub fn is_pinned(&self, id: ObjectId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.strong.is_some())
    }
}

impl fmt::Debug for WrapperTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperTable").field("entries", &self.entries.len()).finish()
    }
}

/// Host wrapper around one native object
pub struct HostObject {
    native: NativeObjectRef,
    serial: u64,
    table: Weak<WrapperTable>,
    state: AtomicU8,
    attrs: Mutex<BTreeMap<String, HostValue>>,
    closures: Mutex<Vec<Arc<ClosureCell>>>,
}

impl HostObject {
    pub fn native(&self) -> &NativeObjectRef {
        &self.native
    }

    pub fn id(&self) -> ObjectId {
        self.native.id()
    }

    pub fn type_name(&self) -> String {
        self.native.class().full_name()
    }

    pub fn state(&self) -> OwnershipState {
        OwnershipState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: OwnershipState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Store host-side state on the wrapper; installs the toggle reference
    pub fn set_attr(&self, name: &str, value: HostValue) {
        self.ensure_toggle_ref();
        self.attrs.lock().insert(name.to_string(), value);
    }

    pub fn get_attr(&self, name: &str) -> Option<HostValue> {
        self.attrs.lock().get(name).cloned()
    }

    /// Switch from a plain reference to a toggle reference, exactly once
    pub fn ensure_toggle_ref(&self) {
        if self
            .state
            .compare_exchange(
                OwnershipState::HostOwned as u8,
                OwnershipState::SharedToggle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let table = self.table.clone();
        self.native.add_toggle_ref(Arc::new(move |id, is_last| {
            if let Some(table) = table.upgrade() {
                table.on_toggle(id, is_last);
            }
        }));
        // Drop the plain reference; the toggle reference replaces it
        self.native.release();

        if self.native.ref_count() > 1 {
            if let Some(table) = self.table.upgrade() {
                table.on_toggle(self.id(), false);
            }
        }
        debug!(event = "toggle_ref_installed", id = self.id(), state = ?self.state());
    }

    /// Track a closure installed on behalf of this wrapper
    pub fn track_closure(self: &Arc<Self>, closure: &Arc<ClosureCell>) {
        closure.set_owner(Arc::downgrade(self));
        self.closures.lock().push(Arc::clone(closure));
    }

    pub fn closure_count(&self) -> usize {
        self.closures.lock().len()
    }

    pub fn downgrade(&self) -> WeakWrapper {
        WeakWrapper::new(&self.native, self.table.clone())
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("type", &self.type_name())
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for HostObject {
    fn drop(&mut self) {
        for closure in self.closures.get_mut().drain(..) {
            closure.invalidate();
        }
        if let Some(table) = self.table.upgrade() {
            table.forget(self.native.id(), self.serial);
        }
        match self.state() {
            OwnershipState::HostOwned => self.native.release(),
            OwnershipState::SharedToggle | OwnershipState::NativeOwned => {
                self.native.remove_toggle_ref()
            }
        }
        trace!(event = "wrapper_drop", id = self.native.id());
    }
}

//! Per-type registrations: boxed vtables, virtual functions, subclasses
//!
//! Virtual function implementations are explicit table entries keyed by the
//! implementing type. Subclass overrides are resolved against the parent's
//! declared signatures once, at registration, and installed as trampolines;
//! a call only walks the type's parent chain to find the nearest entry.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::closure::ClosureCell;
use super::runtime::Runtime;
use crate::errors::{MarshalError, Result};
use crate::host::HostCallable;
use crate::introspection::{ObjectInfo, ScopeType, StructInfo};
use crate::native::{BoxedVTable, NativeCallback, NativeFn};

type VFuncKey = (String, String);

#[derive(Default)]
pub struct TypeRegistry {
    boxed: DashMap<String, BoxedVTable>,
    vfuncs: DashMap<VFuncKey, NativeFn>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_boxed(&self, info: &StructInfo, vtable: BoxedVTable) {
        debug!(event = "register_boxed", type_name = %info.full_name());
        self.boxed.insert(info.full_name(), vtable);
    }

    /// Copy/free hooks for `info`; plain field copies when none registered
    pub fn boxed_vtable(&self, info: &StructInfo) -> BoxedVTable {
        self.boxed
            .get(&info.full_name())
            .map(|e| e.value().clone())
            .unwrap_or_else(BoxedVTable::plain)
    }

    /// Install the native implementation of `name` for `implementor`
    pub fn register_vfunc(&self, implementor: &ObjectInfo, name: &str, func: NativeFn) {
        debug!(event = "register_vfunc", type_name = %implementor.full_name(), vfunc = name);
        self.vfuncs.insert((implementor.full_name(), name.to_string()), func);
    }

    /// Nearest implementation of `name` for instances of `class`
    pub fn lookup_vfunc(&self, class: &ObjectInfo, name: &str) -> Option<NativeFn> {
        class.ancestry().into_iter().find_map(|type_name| {
            self.vfuncs
                .get(&(type_name, name.to_string()))
                .map(|e| e.value().clone())
        })
    }

    /// Derive `name` from `parent`, overriding virtual functions with host
    /// callables. Each override is checked against the parent's declared
    /// signature here, not at call time.
    pub fn register_subclass(
        &self,
        runtime: &Arc<Runtime>,
        parent: &Arc<ObjectInfo>,
        name: &str,
        overrides: Vec<(&str, HostCallable)>,
    ) -> Result<Arc<ObjectInfo>> {
        let class = Arc::new(ObjectInfo::new(&parent.namespace, name, Some(Arc::clone(parent))));

        for (vfunc, callable) in overrides {
            let signature = parent.find_vfunc(vfunc).ok_or_else(|| {
                MarshalError::type_error(format!(
                    "{} has no virtual function '{}'",
                    parent.full_name(),
                    vfunc
                ))
            })?;
            let cache = runtime.cache_for(&signature)?;
            let closure = ClosureCell::new(runtime, cache, callable, None, ScopeType::Forever);
            let trampoline = NativeFn::new(move |frame| closure.invoke(frame));
            self.register_vfunc(&class, vfunc, trampoline);
        }

        debug!(event = "register_subclass", type_name = %class.full_name(), parent = %parent.full_name());
        Ok(class)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("boxed", &self.boxed.len())
            .field("vfuncs", &self.vfuncs.len())
            .finish()
    }
}

//! Foreign struct converters registered by namespace and name

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::host::HostValue;
use crate::introspection::Transfer;
use crate::native::{NativeHeap, NativeValue};

type ToNativeFn = dyn Fn(&Arc<NativeHeap>, &HostValue, Transfer) -> Result<NativeValue> + Send + Sync;
type FromNativeFn = dyn Fn(&NativeValue, Transfer) -> Result<HostValue> + Send + Sync;
type ReleaseFn = dyn Fn(&NativeValue) + Send + Sync;

/// Pluggable converter pair for one foreign struct type
pub struct ForeignMarshaler {
    pub namespace: String,
    pub name: String,
    to_native: Box<ToNativeFn>,
    from_native: Box<FromNativeFn>,
    release: Box<ReleaseFn>,
}

impl ForeignMarshaler {
    pub fn to_native(&self, heap: &Arc<NativeHeap>, value: &HostValue, transfer: Transfer) -> Result<NativeValue> {
        (self.to_native)(heap, value, transfer)
    }

    pub fn from_native(&self, value: &NativeValue, transfer: Transfer) -> Result<HostValue> {
        (self.from_native)(value, transfer)
    }

    pub fn release(&self, value: &NativeValue) {
        (self.release)(value)
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

impl fmt::Debug for ForeignMarshaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignMarshaler({})", self.full_name())
    }
}

#[derive(Debug, Default)]
pub struct ForeignRegistry {
    marshalers: DashMap<(String, String), Arc<ForeignMarshaler>>,
}

impl ForeignRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the converter for `namespace.name`
    pub fn register_foreign(
        &self,
        namespace: &str,
        name: &str,
        to_native: impl Fn(&Arc<NativeHeap>, &HostValue, Transfer) -> Result<NativeValue> + Send + Sync + 'static,
        from_native: impl Fn(&NativeValue, Transfer) -> Result<HostValue> + Send + Sync + 'static,
        release: impl Fn(&NativeValue) + Send + Sync + 'static,
    ) {
        debug!(event = "register_foreign", namespace, name);
        self.marshalers.insert(
            (namespace.to_string(), name.to_string()),
            Arc::new(ForeignMarshaler {
                namespace: namespace.to_string(),
                name: name.to_string(),
                to_native: Box::new(to_native),
                from_native: Box::new(from_native),
                release: Box::new(release),
            }),
        );
    }

    pub fn lookup(&self, namespace: &str, name: &str) -> Option<Arc<ForeignMarshaler>> {
        self.marshalers
            .get(&(namespace.to_string(), name.to_string()))
            .map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.marshalers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marshalers.is_empty()
    }
}

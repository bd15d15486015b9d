//! Registered types: enums/flags, structs, objects and interfaces

use std::sync::Arc;

use super::callable::CallableInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumInfo {
    pub namespace: String,
    pub name: String,
    pub values: Vec<(String, i64)>,
}

impl EnumInfo {
    pub fn new(namespace: &str, name: &str, values: &[(&str, i64)]) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            values: values.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn is_member(&self, value: i64) -> bool {
        self.values.iter().any(|(_, v)| *v == value)
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Union of every declared flag bit
    pub fn known_bits(&self) -> u64 {
        self.values.iter().fold(0, |acc, (_, v)| acc | *v as u64)
    }

    /// Flags value made only of declared bits (zero included)
    pub fn covers_bits(&self, value: u64) -> bool {
        value & !self.known_bits() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    /// Plain struct without copy/free functions
    Plain,
    /// Boxed type with registered copy/free
    Boxed,
    Union,
    /// Reference-counted variant-like value
    Variant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructInfo {
    pub namespace: String,
    pub name: String,
    pub kind: StructKind,
    /// Marshaled by an externally registered converter
    pub is_foreign: bool,
}

impl StructInfo {
    pub fn new(namespace: &str, name: &str, kind: StructKind) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            is_foreign: false,
        })
    }

    pub fn foreign(namespace: &str, name: &str) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind: StructKind::Plain,
            is_foreign: true,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub namespace: String,
    pub name: String,
    pub parent: Option<Arc<ObjectInfo>>,
    pub interfaces: Vec<Arc<ObjectInfo>>,
    pub is_interface: bool,
    /// Virtual function signatures declared by this type
    pub vfuncs: Vec<Arc<CallableInfo>>,
}

impl ObjectInfo {
    pub fn new(namespace: &str, name: &str, parent: Option<Arc<ObjectInfo>>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            parent,
            interfaces: Vec::new(),
            is_interface: false,
            vfuncs: Vec::new(),
        }
    }

    pub fn interface(namespace: &str, name: &str) -> Self {
        Self {
            is_interface: true,
            ..Self::new(namespace, name, None)
        }
    }

    pub fn with_interface(mut self, iface: Arc<ObjectInfo>) -> Self {
        self.interfaces.push(iface);
        self
    }

    pub fn with_vfunc(mut self, vfunc: Arc<CallableInfo>) -> Self {
        self.vfuncs.push(vfunc);
        self
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Same type as, or derived from / implementing `other`
    pub fn is_a(&self, other: &ObjectInfo) -> bool {
        let target = other.full_name();
        let mut current = Some(self);
        while let Some(info) = current {
            if info.full_name() == target
                || info.interfaces.iter().any(|iface| iface.is_a(other))
            {
                return true;
            }
            current = info.parent.as_deref();
        }
        false
    }

    /// Find a virtual function signature on this type or its ancestors
    pub fn find_vfunc(&self, name: &str) -> Option<Arc<CallableInfo>> {
        let mut current = Some(self);
        while let Some(info) = current {
            if let Some(vfunc) = info
                .vfuncs
                .iter()
                .chain(info.interfaces.iter().flat_map(|i| i.vfuncs.iter()))
                .find(|v| v.name == name)
            {
                return Some(Arc::clone(vfunc));
            }
            current = info.parent.as_deref();
        }
        None
    }

    /// Type names from this type up to the root
    pub fn ancestry(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(self);
        while let Some(info) = current {
            names.push(info.full_name());
            current = info.parent.as_deref();
        }
        names
    }
}

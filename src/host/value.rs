//! Host-level values as seen by the dynamic language

use std::fmt;
use std::sync::Arc;

use super::exception::HostException;
use super::lock::HostGuard;
use crate::bridge::{HostBoxed, HostObject};
use crate::errors::Result;
use crate::introspection::EnumInfo;

#[derive(Clone)]
pub enum HostValue {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(Arc<[HostValue]>),
    Tuple(Arc<[HostValue]>),
    Dict(Arc<[(HostValue, HostValue)]>),
    Enum(EnumValue),
    Flags(FlagsValue),
    Object(Arc<HostObject>),
    Boxed(Arc<HostBoxed>),
    Callable(HostCallable),
    /// Opaque native pointer handle
    Pointer(usize),
    Exception(Arc<HostException>),
}

/// Instance of a registered enum wrapper type
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub info: Arc<EnumInfo>,
    pub value: i64,
}

/// Instance of a registered flags wrapper type
#[derive(Debug, Clone, PartialEq)]
pub struct FlagsValue {
    pub info: Arc<EnumInfo>,
    pub value: u64,
}

impl EnumValue {
    pub fn new(info: &Arc<EnumInfo>, value: i64) -> Self {
        Self {
            info: Arc::clone(info),
            value,
        }
    }

    /// Member name, if the value is a declared member
    pub fn name(&self) -> Option<&str> {
        self.info
            .values
            .iter()
            .find(|(_, v)| *v == self.value)
            .map(|(n, _)| n.as_str())
    }
}

impl FlagsValue {
    pub fn new(info: &Arc<EnumInfo>, value: u64) -> Self {
        Self {
            info: Arc::clone(info),
            value,
        }
    }

    pub fn contains(&self, bits: u64) -> bool {
        self.value & bits == bits
    }
}

type CallableFn = dyn Fn(&mut HostGuard<'_>, &[HostValue]) -> Result<HostValue> + Send + Sync;

/// Host function object; runs with the host lock held
#[derive(Clone)]
pub struct HostCallable(Arc<CallableFn>);

impl HostCallable {
    pub fn new(
        f: impl Fn(&mut HostGuard<'_>, &[HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, guard: &mut HostGuard<'_>, args: &[HostValue]) -> Result<HostValue> {
        (self.0)(guard, args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function at {:p}>", Arc::as_ptr(&self.0) as *const ())
    }
}

impl HostValue {
    pub fn str(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }

    pub fn list(items: impl Into<Vec<HostValue>>) -> Self {
        Self::List(Arc::from(items.into()))
    }

    pub fn tuple(items: impl Into<Vec<HostValue>>) -> Self {
        Self::Tuple(Arc::from(items.into()))
    }

    pub fn dict(entries: impl Into<Vec<(HostValue, HostValue)>>) -> Self {
        Self::Dict(Arc::from(entries.into()))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Name of the value's host type, for error messages
    pub fn type_name(&self) -> String {
        match self {
            Self::None => "NoneType".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Str(_) => "str".to_string(),
            Self::Bytes(_) => "bytes".to_string(),
            Self::List(_) => "list".to_string(),
            Self::Tuple(_) => "tuple".to_string(),
            Self::Dict(_) => "dict".to_string(),
            Self::Enum(e) => e.info.full_name(),
            Self::Flags(f) => f.info.full_name(),
            Self::Object(o) => o.type_name(),
            Self::Boxed(b) => b.type_name(),
            Self::Callable(_) => "function".to_string(),
            Self::Pointer(_) => "gpointer".to_string(),
            Self::Exception(e) => e.type_name().to_string(),
        }
    }

    /// Sequence items for list, tuple, or bytes values
    pub fn as_sequence(&self) -> Option<Vec<HostValue>> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items.to_vec()),
            Self::Bytes(bytes) => Some(bytes.iter().map(|b| Self::Int(*b as i128)).collect()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(*b as i128),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<HostObject>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_boxed(&self) -> Option<&Arc<HostBoxed>> {
        match self {
            Self::Boxed(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:?}", v),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Tuple(items) => {
                let mut t = f.debug_tuple("");
                for item in items.iter() {
                    t.field(item);
                }
                t.finish()
            }
            Self::Dict(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Self::Enum(e) => match e.name() {
                Some(name) => write!(f, "<{}.{}: {}>", e.info.full_name(), name, e.value),
                None => write!(f, "<{}: {}>", e.info.full_name(), e.value),
            },
            Self::Flags(v) => write!(f, "<{}: {:#x}>", v.info.full_name(), v.value),
            Self::Object(o) => write!(f, "<{} object #{}>", o.type_name(), o.id()),
            Self::Boxed(b) => write!(f, "<{} boxed>", b.type_name()),
            Self::Callable(c) => write!(f, "{:?}", c),
            Self::Pointer(p) => write!(f, "<gpointer {:#x}>", p),
            Self::Exception(e) => write!(f, "{}({:?})", e.type_name(), e.message()),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Flags(a), Self::Flags(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Boxed(a), Self::Boxed(b)) => Arc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            (Self::Pointer(a), Self::Pointer(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for HostValue {
            fn from(v: $t) -> Self {
                Self::Int(v as i128)
            }
        })*
    };
}

from_int!(i8, u8, i16, u16, i32, u32, i64, u64, i128);

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        Self::str(v)
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Arc::from(v))
    }
}

impl From<Arc<HostObject>> for HostValue {
    fn from(v: Arc<HostObject>) -> Self {
        Self::Object(v)
    }
}

impl From<HostCallable> for HostValue {
    fn from(v: HostCallable) -> Self {
        Self::Callable(v)
    }
}

//! Per-argument cache entries

use num_traits::ToPrimitive;
use std::sync::Arc;

use super::callable::CallableCache;
use crate::bridge::ForeignMarshaler;
use crate::introspection::{
    ArrayType, CallableInfo, Direction, EnumInfo, ListKind, ObjectInfo, ScopeType, StructInfo,
    Transfer, TypeTag,
};
use crate::native::NativeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl IntWidth {
    pub fn from_tag(tag: &TypeTag) -> Option<Self> {
        Some(match tag {
            TypeTag::Int8 => Self::I8,
            TypeTag::UInt8 => Self::U8,
            TypeTag::Int16 => Self::I16,
            TypeTag::UInt16 => Self::U16,
            TypeTag::Int32 => Self::I32,
            TypeTag::UInt32 => Self::U32,
            TypeTag::Int64 => Self::I64,
            TypeTag::UInt64 => Self::U64,
            _ => return None,
        })
    }

    /// Inclusive (min, max)
    pub fn bounds(self) -> (i128, i128) {
        match self {
            Self::I8 => (i8::MIN as i128, i8::MAX as i128),
            Self::U8 => (0, u8::MAX as i128),
            Self::I16 => (i16::MIN as i128, i16::MAX as i128),
            Self::U16 => (0, u16::MAX as i128),
            Self::I32 => (i32::MIN as i128, i32::MAX as i128),
            Self::U32 => (0, u32::MAX as i128),
            Self::I64 => (i64::MIN as i128, i64::MAX as i128),
            Self::U64 => (0, u64::MAX as i128),
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub fn byte_size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 => 4,
            Self::I64 | Self::U64 => 8,
        }
    }

    /// Narrow into a native slot; `None` when out of range
    pub fn to_native(self, value: i128) -> Option<NativeValue> {
        match self {
            Self::I8 => value.to_i8().map(NativeValue::Int8),
            Self::U8 => value.to_u8().map(NativeValue::UInt8),
            Self::I16 => value.to_i16().map(NativeValue::Int16),
            Self::U16 => value.to_u16().map(NativeValue::UInt16),
            Self::I32 => value.to_i32().map(NativeValue::Int32),
            Self::U32 => value.to_u32().map(NativeValue::UInt32),
            Self::I64 => value.to_i64().map(NativeValue::Int64),
            Self::U64 => value.to_u64().map(NativeValue::UInt64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    F32,
    F64,
}

/// Container shape of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Scalar,
    FixedArray,
    LengthArray,
    ZeroTerminatedArray,
    LinkedList,
    HashMap,
    Callback,
    ErrorOut,
}

/// How the argument's value is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaRole {
    /// Supplied by a host argument
    None,
    /// Other arguments derive from this one
    Parent,
    /// Derived from `parent` (array length, destroy notify). A `parent` equal
    /// to the argument count names the return value.
    Child { parent: usize },
    /// Opaque user data of the callback at `callback`
    Closure { callback: usize },
}

#[derive(Debug, Clone)]
pub struct ArrayCache {
    pub element: ArgCache,
    pub array_type: ArrayType,
    pub fixed_size: Option<usize>,
    pub zero_terminated: bool,
    /// Native index of the companion length argument
    pub length_index: Option<usize>,
}

impl ArrayCache {
    /// Elements are single bytes (bulk copy eligible)
    pub fn is_byte_sized(&self) -> bool {
        matches!(self.element.kind, ArgKind::Int(IntWidth::U8 | IntWidth::I8))
    }
}

#[derive(Debug, Clone)]
pub struct ListCache {
    pub element: ArgCache,
    pub kind: ListKind,
}

#[derive(Debug, Clone)]
pub struct HashCache {
    pub key: ArgCache,
    pub value: ArgCache,
}

#[derive(Debug, Clone)]
pub struct StructCache {
    pub info: Arc<StructInfo>,
    pub foreign: Option<Arc<ForeignMarshaler>>,
}

#[derive(Debug, Clone)]
pub struct CallbackCache {
    pub info: Arc<CallableInfo>,
    /// Signature cache used when native code invokes the closure
    pub cache: Arc<CallableCache>,
    pub scope: ScopeType,
    pub user_data_index: Option<usize>,
    pub destroy_index: Option<usize>,
}

/// Argument kind; each variant carries only what its marshalers need
#[derive(Debug, Clone)]
pub enum ArgKind {
    Void { is_pointer: bool },
    Boolean,
    Int(IntWidth),
    Float(FloatWidth),
    UniChar,
    Utf8,
    Filename,
    Array(Box<ArrayCache>),
    List(Box<ListCache>),
    HashTable(Box<HashCache>),
    Error,
    Enum(Arc<EnumInfo>),
    Flags(Arc<EnumInfo>),
    Struct(StructCache),
    Object(Arc<ObjectInfo>),
    Callback(Box<CallbackCache>),
    DestroyNotify,
}

impl ArgKind {
    /// Native value used for omitted arguments and zeroed slots
    pub fn zero_value(&self) -> NativeValue {
        match self {
            Self::Void { is_pointer: true } => NativeValue::Pointer(0),
            Self::Void { is_pointer: false } => NativeValue::Void,
            Self::Boolean => NativeValue::Boolean(false),
            Self::Int(width) => width.to_native(0).unwrap_or_default(),
            Self::Float(FloatWidth::F32) => NativeValue::Float(0.0),
            Self::Float(FloatWidth::F64) => NativeValue::Double(0.0),
            Self::UniChar => NativeValue::UniChar(0),
            Self::Utf8 | Self::Filename => NativeValue::String(None),
            Self::Array(_) => NativeValue::Array(None),
            Self::List(_) => NativeValue::List(None),
            Self::HashTable(_) => NativeValue::HashTable(None),
            Self::Error => NativeValue::Error(None),
            Self::Enum(_) => NativeValue::Enum(0),
            Self::Flags(_) => NativeValue::Flags(0),
            Self::Struct(_) => NativeValue::Boxed(None),
            Self::Object(_) => NativeValue::Object(None),
            Self::Callback(_) => NativeValue::Callback(None),
            Self::DestroyNotify => NativeValue::DestroyNotify(None),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Void { is_pointer: true } => "gpointer".to_string(),
            Self::Void { is_pointer: false } => "void".to_string(),
            Self::Boolean => "gboolean".to_string(),
            Self::Int(width) => format!("{:?}", width).to_lowercase(),
            Self::Float(FloatWidth::F32) => "gfloat".to_string(),
            Self::Float(FloatWidth::F64) => "gdouble".to_string(),
            Self::UniChar => "gunichar".to_string(),
            Self::Utf8 => "utf8".to_string(),
            Self::Filename => "filename".to_string(),
            Self::Array(_) => "array".to_string(),
            Self::List(_) => "list".to_string(),
            Self::HashTable(_) => "hash table".to_string(),
            Self::Error => "GError".to_string(),
            Self::Enum(info) | Self::Flags(info) => info.full_name(),
            Self::Struct(s) => s.info.full_name(),
            Self::Object(info) => info.full_name(),
            Self::Callback(cb) => cb.info.full_name(),
            Self::DestroyNotify => "GDestroyNotify".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArgCache {
    pub name: String,
    pub kind: ArgKind,
    pub direction: Direction,
    pub transfer: Transfer,
    pub allow_none: bool,
    pub is_caller_allocates: bool,
    pub has_default: bool,
    pub default_value: NativeValue,
    /// Position in the host-visible argument list
    pub host_arg_index: Option<usize>,
    /// Native call position; `None` for the return value and elements
    pub native_arg_index: Option<usize>,
    pub meta: MetaRole,
}

impl ArgCache {
    pub fn new(name: &str, kind: ArgKind, direction: Direction, transfer: Transfer) -> Self {
        let default_value = kind.zero_value();
        Self {
            name: name.to_string(),
            kind,
            direction,
            transfer,
            allow_none: false,
            is_caller_allocates: false,
            has_default: false,
            default_value,
            host_arg_index: None,
            native_arg_index: None,
            meta: MetaRole::None,
        }
    }

    pub fn container_kind(&self) -> ContainerKind {
        match &self.kind {
            ArgKind::Array(array) if array.fixed_size.is_some() => ContainerKind::FixedArray,
            ArgKind::Array(array) if array.zero_terminated => ContainerKind::ZeroTerminatedArray,
            ArgKind::Array(_) => ContainerKind::LengthArray,
            ArgKind::List(_) => ContainerKind::LinkedList,
            ArgKind::HashTable(_) => ContainerKind::HashMap,
            ArgKind::Callback(_) => ContainerKind::Callback,
            ArgKind::Error => ContainerKind::ErrorOut,
            _ => ContainerKind::Scalar,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, ArgKind::Void { is_pointer: false })
    }

    /// Hidden from the host: derived companions and closure data filled by a parent
    pub fn is_child(&self) -> bool {
        matches!(self.meta, MetaRole::Child { .. })
    }

    pub fn is_closure(&self) -> bool {
        matches!(self.meta, MetaRole::Closure { .. })
    }

    /// Element cache for a container with this argument's shape
    pub fn element(name: &str, kind: ArgKind, parent: &ArgCache) -> Self {
        let mut cache = Self::new(name, kind, parent.direction, parent.transfer.for_elements());
        cache.allow_none = true;
        cache
    }
}

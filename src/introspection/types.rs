//! Type descriptors as reported by the metadata source

use std::sync::Arc;

use super::callable::CallableInfo;
use super::registered::{EnumInfo, ObjectInfo, StructInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    #[inline]
    pub fn is_from_host(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    #[inline]
    pub fn is_to_host(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// Ownership transfer rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transfer {
    /// Each side keeps its own ownership
    Nothing,
    /// The container transfers, its elements do not
    Container,
    /// Full ownership transfers
    Everything,
}

impl Transfer {
    /// Rule applied to the elements of a container with this rule
    #[inline]
    pub fn for_elements(self) -> Self {
        match self {
            Self::Everything => Self::Everything,
            Self::Container | Self::Nothing => Self::Nothing,
        }
    }
}

/// Lifetime of a callback closure handed to native code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeType {
    /// Valid for the duration of the call
    Call,
    /// Released after the first invocation
    Async,
    /// Released by the destroy-notify companion
    Notified,
    /// Never released
    Forever,
}

/// Native array conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayType {
    /// Raw native array; length from fixed size, terminator or companion
    C,
    /// Growable, length-tagged array
    Array,
    /// Growable pointer array
    PtrArray,
    /// Growable byte array
    ByteArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Singly,
    Doubly,
}

#[derive(Debug, Clone)]
pub enum InterfaceInfo {
    Enum(Arc<EnumInfo>),
    Flags(Arc<EnumInfo>),
    Struct(Arc<StructInfo>),
    Object(Arc<ObjectInfo>),
    Callback(Arc<CallableInfo>),
}

impl InterfaceInfo {
    pub fn full_name(&self) -> String {
        match self {
            Self::Enum(info) | Self::Flags(info) => info.full_name(),
            Self::Struct(info) => info.full_name(),
            Self::Object(info) => info.full_name(),
            Self::Callback(info) => info.full_name(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypeTag {
    Void,
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    UniChar,
    Utf8,
    Filename,
    Array {
        array_type: ArrayType,
        element: Box<TypeInfo>,
        fixed_size: Option<usize>,
        zero_terminated: bool,
        /// Index of the companion length argument
        length: Option<usize>,
    },
    List {
        kind: ListKind,
        element: Box<TypeInfo>,
    },
    HashTable {
        key: Box<TypeInfo>,
        value: Box<TypeInfo>,
    },
    Error,
    Interface(InterfaceInfo),
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub tag: TypeTag,
    pub is_pointer: bool,
}

impl TypeInfo {
    pub fn new(tag: TypeTag) -> Self {
        let is_pointer = matches!(
            tag,
            TypeTag::Utf8
                | TypeTag::Filename
                | TypeTag::Array { .. }
                | TypeTag::List { .. }
                | TypeTag::HashTable { .. }
                | TypeTag::Error
                | TypeTag::Interface(InterfaceInfo::Struct(_) | InterfaceInfo::Object(_))
        );
        Self { tag, is_pointer }
    }

    pub fn void() -> Self {
        Self::new(TypeTag::Void)
    }

    /// Opaque `void *`
    pub fn pointer() -> Self {
        Self {
            tag: TypeTag::Void,
            is_pointer: true,
        }
    }

    pub fn boolean() -> Self {
        Self::new(TypeTag::Boolean)
    }

    pub fn int8() -> Self {
        Self::new(TypeTag::Int8)
    }

    pub fn uint8() -> Self {
        Self::new(TypeTag::UInt8)
    }

    pub fn int16() -> Self {
        Self::new(TypeTag::Int16)
    }

    pub fn uint16() -> Self {
        Self::new(TypeTag::UInt16)
    }

    pub fn int32() -> Self {
        Self::new(TypeTag::Int32)
    }

    pub fn uint32() -> Self {
        Self::new(TypeTag::UInt32)
    }

    pub fn int64() -> Self {
        Self::new(TypeTag::Int64)
    }

    pub fn uint64() -> Self {
        Self::new(TypeTag::UInt64)
    }

    pub fn float() -> Self {
        Self::new(TypeTag::Float)
    }

    pub fn double() -> Self {
        Self::new(TypeTag::Double)
    }

    pub fn unichar() -> Self {
        Self::new(TypeTag::UniChar)
    }

    pub fn utf8() -> Self {
        Self::new(TypeTag::Utf8)
    }

    pub fn filename() -> Self {
        Self::new(TypeTag::Filename)
    }

    pub fn error() -> Self {
        Self::new(TypeTag::Error)
    }

    fn array(array_type: ArrayType, element: TypeInfo) -> Self {
        Self::new(TypeTag::Array {
            array_type,
            element: Box::new(element),
            fixed_size: None,
            zero_terminated: false,
            length: None,
        })
    }

    pub fn c_array(element: TypeInfo) -> Self {
        Self::array(ArrayType::C, element)
    }

    pub fn garray(element: TypeInfo) -> Self {
        Self::array(ArrayType::Array, element)
    }

    pub fn ptr_array(element: TypeInfo) -> Self {
        Self::array(ArrayType::PtrArray, element)
    }

    pub fn byte_array() -> Self {
        Self::array(ArrayType::ByteArray, TypeInfo::uint8())
    }

    /// Fixed element count (arrays only)
    pub fn with_fixed_size(mut self, size: usize) -> Self {
        if let TypeTag::Array { fixed_size, .. } = &mut self.tag {
            *fixed_size = Some(size);
        }
        self
    }

    /// Zero-terminated (arrays only)
    pub fn zero_terminated(mut self) -> Self {
        if let TypeTag::Array { zero_terminated, .. } = &mut self.tag {
            *zero_terminated = true;
        }
        self
    }

    /// Companion length argument (arrays only)
    pub fn with_length(mut self, index: usize) -> Self {
        if let TypeTag::Array { length, .. } = &mut self.tag {
            *length = Some(index);
        }
        self
    }

    pub fn glist(element: TypeInfo) -> Self {
        Self::new(TypeTag::List {
            kind: ListKind::Doubly,
            element: Box::new(element),
        })
    }

    pub fn gslist(element: TypeInfo) -> Self {
        Self::new(TypeTag::List {
            kind: ListKind::Singly,
            element: Box::new(element),
        })
    }

    pub fn hash_table(key: TypeInfo, value: TypeInfo) -> Self {
        Self::new(TypeTag::HashTable {
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    pub fn enumeration(info: Arc<EnumInfo>) -> Self {
        Self::new(TypeTag::Interface(InterfaceInfo::Enum(info)))
    }

    pub fn flags(info: Arc<EnumInfo>) -> Self {
        Self::new(TypeTag::Interface(InterfaceInfo::Flags(info)))
    }

    pub fn boxed(info: Arc<StructInfo>) -> Self {
        Self::new(TypeTag::Interface(InterfaceInfo::Struct(info)))
    }

    pub fn object(info: Arc<ObjectInfo>) -> Self {
        Self::new(TypeTag::Interface(InterfaceInfo::Object(info)))
    }

    pub fn callback(info: Arc<CallableInfo>) -> Self {
        Self::new(TypeTag::Interface(InterfaceInfo::Callback(info)))
    }

    pub fn is_void(&self) -> bool {
        matches!(self.tag, TypeTag::Void) && !self.is_pointer
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match &self.tag {
            TypeTag::Void if self.is_pointer => "gpointer".to_string(),
            TypeTag::Void => "void".to_string(),
            TypeTag::Boolean => "gboolean".to_string(),
            TypeTag::Int8 => "gint8".to_string(),
            TypeTag::UInt8 => "guint8".to_string(),
            TypeTag::Int16 => "gint16".to_string(),
            TypeTag::UInt16 => "guint16".to_string(),
            TypeTag::Int32 => "gint32".to_string(),
            TypeTag::UInt32 => "guint32".to_string(),
            TypeTag::Int64 => "gint64".to_string(),
            TypeTag::UInt64 => "guint64".to_string(),
            TypeTag::Float => "gfloat".to_string(),
            TypeTag::Double => "gdouble".to_string(),
            TypeTag::UniChar => "gunichar".to_string(),
            TypeTag::Utf8 => "utf8".to_string(),
            TypeTag::Filename => "filename".to_string(),
            TypeTag::Array { element, .. } => format!("array<{}>", element.describe()),
            TypeTag::List { element, .. } => format!("list<{}>", element.describe()),
            TypeTag::HashTable { key, value } => {
                format!("hash<{}, {}>", key.describe(), value.describe())
            }
            TypeTag::Error => "GError".to_string(),
            TypeTag::Interface(iface) => iface.full_name(),
        }
    }
}

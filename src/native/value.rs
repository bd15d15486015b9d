//! Native argument slots and container representations
//!
//! A `NativeValue` is what one native argument, out-slot or return slot holds.
//! Pointer-like payloads clone as pointer copies: two clones of a string slot
//! name the same allocation.

use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

use super::boxed::NativeBoxed;
use super::call::{DestroyNotify, NativeClosure};
use super::error::NativeError;
use super::heap::{AllocKind, Allocation, NativeHeap};
use super::object::NativeObjectRef;
use crate::introspection::{ArrayType, ListKind};

#[derive(Clone, Debug, Default)]
pub enum NativeValue {
    #[default]
    Void,
    Boolean(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    UniChar(u32),
    /// Opaque pointer (user data, raw handles)
    Pointer(usize),
    String(Option<NativeString>),
    Array(Option<NativeArray>),
    List(Option<NativeList>),
    HashTable(Option<NativeHashTable>),
    Enum(i64),
    Flags(u64),
    Boxed(Option<NativeBoxed>),
    Object(Option<NativeObjectRef>),
    Callback(Option<NativeClosure>),
    DestroyNotify(Option<DestroyNotify>),
    Error(Option<NativeError>),
}

impl NativeValue {
    /// True for null pointers and zero scalars; used for terminator scans
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Void => true,
            Self::Boolean(b) => !b,
            Self::Int8(v) => *v == 0,
            Self::UInt8(v) => *v == 0,
            Self::Int16(v) => *v == 0,
            Self::UInt16(v) => *v == 0,
            Self::Int32(v) => *v == 0,
            Self::UInt32(v) => *v == 0,
            Self::Int64(v) => *v == 0,
            Self::UInt64(v) => *v == 0,
            Self::Float(v) => *v == 0.0,
            Self::Double(v) => *v == 0.0,
            Self::UniChar(v) => *v == 0,
            Self::Pointer(p) => *p == 0,
            Self::Enum(v) => *v == 0,
            Self::Flags(v) => *v == 0,
            Self::String(v) => v.is_none(),
            Self::Array(v) => v.is_none(),
            Self::List(v) => v.is_none(),
            Self::HashTable(v) => v.is_none(),
            Self::Boxed(v) => v.is_none(),
            Self::Object(v) => v.is_none(),
            Self::Callback(v) => v.is_none(),
            Self::DestroyNotify(v) => v.is_none(),
            Self::Error(v) => v.is_none(),
        }
    }

    /// Widen any integer-like slot (including enums, flags and unichars)
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Self::Boolean(b) => *b as i128,
            Self::Int8(v) => *v as i128,
            Self::UInt8(v) => *v as i128,
            Self::Int16(v) => *v as i128,
            Self::UInt16(v) => *v as i128,
            Self::Int32(v) => *v as i128,
            Self::UInt32(v) => *v as i128,
            Self::Int64(v) => *v as i128,
            Self::UInt64(v) => *v as i128,
            Self::UniChar(v) => *v as i128,
            Self::Enum(v) => *v as i128,
            Self::Flags(v) => *v as i128,
            Self::Pointer(p) => *p as i128,
            _ => return None,
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(Some(s)) => s.to_str(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&NativeObjectRef> {
        match self {
            Self::Object(Some(o)) => Some(o),
            _ => None,
        }
    }

    pub fn as_boxed(&self) -> Option<&NativeBoxed> {
        match self {
            Self::Boxed(Some(b)) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NativeArray> {
        match self {
            Self::Array(Some(a)) => Some(a),
            _ => None,
        }
    }
}

/// Encoded text owned by one native allocation
#[derive(Clone)]
pub struct NativeString {
    alloc: Allocation,
    bytes: Arc<[u8]>,
}

impl NativeString {
    pub fn new(heap: &Arc<NativeHeap>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            alloc: heap.alloc(AllocKind::String),
            bytes: bytes.into(),
        }
    }

    pub fn from_text(heap: &Arc<NativeHeap>, text: &str) -> Self {
        Self::new(heap, text.as_bytes())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn alloc(&self) -> &Allocation {
        &self.alloc
    }

    /// Fresh allocation with the same contents
    pub fn duplicate(&self) -> Self {
        Self {
            alloc: self.alloc.heap().alloc(AllocKind::String),
            bytes: Arc::clone(&self.bytes),
        }
    }
}

impl fmt::Debug for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{:?}", String::from_utf8_lossy(&self.bytes), self.alloc)
    }
}

/// Array storage: either element slots or a raw byte buffer
#[derive(Clone, Debug)]
pub enum ArrayData {
    Items(Vec<NativeValue>),
    Bytes(Vec<u8>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            Self::Items(items) => items.len(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One native array buffer. Clones share the buffer.
#[derive(Clone)]
pub struct NativeArray {
    alloc: Allocation,
    array_type: ArrayType,
    data: Arc<Mutex<ArrayData>>,
}

impl NativeArray {
    pub fn new(heap: &Arc<NativeHeap>, array_type: ArrayType, data: ArrayData) -> Self {
        Self {
            alloc: heap.alloc(AllocKind::Array),
            array_type,
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub fn from_items(heap: &Arc<NativeHeap>, array_type: ArrayType, items: Vec<NativeValue>) -> Self {
        Self::new(heap, array_type, ArrayData::Items(items))
    }

    pub fn from_bytes(heap: &Arc<NativeHeap>, array_type: ArrayType, bytes: Vec<u8>) -> Self {
        Self::new(heap, array_type, ArrayData::Bytes(bytes))
    }

    pub fn alloc(&self) -> &Allocation {
        &self.alloc
    }

    pub fn array_type(&self) -> ArrayType {
        self.array_type
    }

    /// Buffer capacity in elements (terminator included)
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> MutexGuard<'_, ArrayData> {
        self.data.lock()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> ArrayData {
        self.data.lock().clone()
    }

    /// Overwrite one element; out of range writes are ignored
    pub fn set(&self, index: usize, value: NativeValue) {
        let mut data = self.data.lock();
        match (&mut *data, value) {
            (ArrayData::Items(items), value) => {
                if let Some(slot) = items.get_mut(index) {
                    *slot = value;
                }
            }
            (ArrayData::Bytes(bytes), value) => {
                if let (Some(slot), Some(v)) = (bytes.get_mut(index), value.as_i128()) {
                    *slot = v as u8;
                }
            }
        }
    }

    /// Replace the whole buffer contents (growable array types)
    pub fn replace(&self, data: ArrayData) {
        *self.data.lock() = data;
    }
}

impl fmt::Debug for NativeArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeArray")
            .field("alloc", &self.alloc)
            .field("array_type", &self.array_type)
            .field("data", &*self.data.lock())
            .finish()
    }
}

/// Linked list; the spine is one allocation
#[derive(Clone, Debug)]
pub struct NativeList {
    alloc: Allocation,
    kind: ListKind,
    items: Arc<Vec<NativeValue>>,
}

impl NativeList {
    pub fn new(heap: &Arc<NativeHeap>, kind: ListKind, items: Vec<NativeValue>) -> Self {
        Self {
            alloc: heap.alloc(AllocKind::List),
            kind,
            items: Arc::new(items),
        }
    }

    pub fn alloc(&self) -> &Allocation {
        &self.alloc
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn items(&self) -> &[NativeValue] {
        &self.items
    }
}

/// Hashing/equality strategy chosen from the key kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStrategy {
    /// String hash and equality
    Str,
    /// Pointer identity
    Direct,
}

#[derive(Clone, Debug)]
pub struct NativeHashTable {
    alloc: Allocation,
    strategy: HashStrategy,
    entries: Arc<Vec<(NativeValue, NativeValue)>>,
}

impl NativeHashTable {
    pub fn new(
        heap: &Arc<NativeHeap>,
        strategy: HashStrategy,
        entries: Vec<(NativeValue, NativeValue)>,
    ) -> Self {
        Self {
            alloc: heap.alloc(AllocKind::HashTable),
            strategy,
            entries: Arc::new(entries),
        }
    }

    pub fn alloc(&self) -> &Allocation {
        &self.alloc
    }

    pub fn strategy(&self) -> HashStrategy {
        self.strategy
    }

    pub fn entries(&self) -> &[(NativeValue, NativeValue)] {
        &self.entries
    }

    /// Look a value up using the table's own equality
    pub fn lookup(&self, key: &NativeValue) -> Option<&NativeValue> {
        self.entries
            .iter()
            .find(|(k, _)| match self.strategy {
                HashStrategy::Str => k.as_str().is_some() && k.as_str() == key.as_str(),
                HashStrategy::Direct => match (k.as_i128(), key.as_i128()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            })
            .map(|(_, v)| v)
    }
}

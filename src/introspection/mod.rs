//! Reflective metadata consumed by the cache builder
//!
//! Design: signatures are plain data built once and shared behind `Arc`.
//! Nothing here invokes native code; `CallableKind` only names how to reach it.

mod callable;
mod registered;
mod repository;
mod types;

pub use callable::{ArgInfo, CallableInfo, CallableKind};
pub use registered::{EnumInfo, ObjectInfo, StructInfo, StructKind};
pub use repository::{MetadataSource, Repository};
pub use types::{ArrayType, Direction, InterfaceInfo, ListKind, ScopeType, Transfer, TypeInfo, TypeTag};

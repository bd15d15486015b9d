//! gimarshal: invocation and marshaling core for binding a dynamic host
//! language to an introspectable native object system.
//!
//! A call flows through four layers:
//! - `introspection` describes signatures and registered types
//! - `cache` turns a signature into per-argument marshaling instructions
//! - `marshal` converts values in both directions and tracks ownership
//! - `invoke` drives one call through its stages and cleans up on failure
//!
//! `bridge` keeps host wrappers, closures and native values alive exactly as
//! long as either side needs them.

// Core modules
pub mod bridge;
pub mod cache;
pub mod config;
pub mod errors;
pub mod host;
pub mod introspection;
pub mod invoke;
pub mod logging;
pub mod marshal;
pub mod native;

// Re-export commonly used items
pub use bridge::{
    ClosureCell, ForeignMarshaler, ForeignRegistry, HostBoxed, HostObject, InvokeStats,
    OwnershipState, Runtime, WeakWrapper,
};
pub use cache::{ArgCache, ArgKind, CallableCache};
pub use config::RuntimeConfig;
pub use errors::{ErrorKind, MarshalError, Result};
pub use host::{HostCallable, HostException, HostGuard, HostValue};
pub use introspection::{
    ArgInfo, CallableInfo, Direction, EnumInfo, ObjectInfo, ScopeType, StructInfo, Transfer,
    TypeInfo,
};
pub use invoke::{invoke, invoke_callback};
pub use native::{NativeError, NativeFn, NativeHeap, NativeValue};

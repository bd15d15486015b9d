//! Native side model
//!
//! Design: native values are what a C-level callee would see in its argument
//! slots. Every allocation goes through the `NativeHeap` ledger so ownership
//! mistakes (leaks, double frees) are detectable from tests and at shutdown.

mod boxed;
mod call;
mod error;
mod heap;
mod object;
mod value;

pub use boxed::{BoxedInstance, BoxedVTable, NativeBoxed};
pub use call::{DestroyNotify, NativeCallback, NativeClosure, NativeFn, NativeFrame};
pub use error::NativeError;
pub use heap::{AllocKind, Allocation, HeapStats, NativeHeap};
pub use object::{NativeObject, NativeObjectRef, ObjectId, ToggleNotify, WeakNotify};
pub use value::{ArrayData, HashStrategy, NativeArray, NativeHashTable, NativeList, NativeString, NativeValue};

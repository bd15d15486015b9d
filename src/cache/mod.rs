//! Type Cache: per-callable argument descriptions
//!
//! Design: every argument is an `ArgCache` whose `ArgKind` is a sum type, so
//! the marshalers are exhaustive matches instead of tag switches. Caches are
//! immutable after construction and shared behind `Arc`.

mod arg;
mod callable;
mod store;

pub use arg::{
    ArgCache, ArgKind, ArrayCache, CallbackCache, ContainerKind, FloatWidth, HashCache, IntWidth,
    ListCache, MetaRole, StructCache,
};
pub use callable::{CallableCache, InvokerKind};
pub use store::CacheStore;

//! Ownership and lifetime bridge between host wrappers and native values

mod boxed;
mod closure;
mod foreign;
mod runtime;
mod types;
mod weak;
mod wrapper;

pub use boxed::HostBoxed;
pub use closure::ClosureCell;
pub use foreign::{ForeignMarshaler, ForeignRegistry};
pub use runtime::{InvokeStats, Runtime};
pub use types::TypeRegistry;
pub use weak::WeakWrapper;
pub use wrapper::{HostObject, OwnershipState, WrapperTable};

#[cfg(test)]
mod tests;

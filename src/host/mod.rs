//! Host side model: values, callables, exceptions and the interpreter lock

mod exception;
mod lock;
mod value;

pub use exception::{HostException, NATIVE_ERROR_TYPE};
pub use lock::{HostGuard, HostLock};
pub use value::{EnumValue, FlagsValue, HostCallable, HostValue};

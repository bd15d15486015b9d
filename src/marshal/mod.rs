//! Value marshaling between host values and native slots
//!
//! Design: `from_host` and `to_host` are exhaustive matches over `ArgKind`,
//! so every kind has both directions spelled out (unsupported combinations
//! fail with `NotImplemented`, never silently).
//!
//! Ownership rules:
//! - `from_host` records every native resource it creates in a
//!   `CleanupData`, split by whether the callee takes it over
//! - `to_host` consumes the native value according to the transfer rule,
//!   on success and on failure alike
//! - `release_native` drops a native value that will never reach the host

mod basic;
mod callback;
mod cleanup_data;
mod container;
mod interface;
mod release;

pub use cleanup_data::{CleanupData, Owned};
pub use release::release_native;

use smallvec::SmallVec;
use std::sync::Arc;
use tracing::trace;

use crate::bridge::{HostObject, Runtime};
use crate::cache::{ArgCache, ArgKind, CallableCache};
use crate::errors::{MarshalError, Result};
use crate::host::HostValue;
use crate::invoke::HostArg;
use crate::native::{NativeHeap, NativeValue};

/// State available while converting host values for one call
pub struct InContext<'a> {
    pub runtime: &'a Arc<Runtime>,
    /// Signature being marshaled, for companion arguments
    pub callable: Option<&'a CallableCache>,
    /// Combined host arguments, for callback user data
    pub host_args: &'a [HostArg],
    /// Wrapper the call is made on; closures created here are tracked by it
    pub owner: Option<&'a Arc<HostObject>>,
}

impl InContext<'_> {
    pub fn heap(&self) -> &Arc<NativeHeap> {
        self.runtime.heap()
    }
}

/// State available while converting native outputs
pub struct OutContext<'a> {
    pub runtime: &'a Arc<Runtime>,
    pub callable: Option<&'a CallableCache>,
    /// Native argument slots after the call, for companion lengths
    pub native_args: &'a [NativeValue],
}

/// Result of one host-to-native conversion
#[derive(Debug, Default)]
pub struct Marshaled {
    pub value: NativeValue,
    pub cleanup: CleanupData,
    /// Companion slots filled by this argument (native index, value)
    pub children: SmallVec<[(usize, NativeValue); 2]>,
}

impl Marshaled {
    pub fn plain(value: NativeValue) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn owned(value: NativeValue, cleanup: CleanupData) -> Self {
        Self {
            value,
            cleanup,
            children: SmallVec::new(),
        }
    }
}

/// Convert `value` into the native representation described by `arg`
pub fn from_host(ctx: &InContext<'_>, arg: &ArgCache, value: &HostValue) -> Result<Marshaled> {
    trace!(event = "marshal_in", arg = %arg.name, kind = %arg.kind.name());
    match &arg.kind {
        ArgKind::Void { is_pointer } => basic::void_from_host(*is_pointer, value).map(Marshaled::plain),
        ArgKind::Boolean => Ok(Marshaled::plain(NativeValue::Boolean(basic::truthy(value)))),
        ArgKind::Int(width) => basic::int_from_host(*width, value).map(Marshaled::plain),
        ArgKind::Float(width) => basic::float_from_host(*width, value).map(Marshaled::plain),
        ArgKind::UniChar => basic::unichar_from_host(arg, value).map(Marshaled::plain),
        ArgKind::Utf8 => basic::utf8_from_host(ctx, arg, value),
        ArgKind::Filename => basic::filename_from_host(ctx, arg, value),
        ArgKind::Enum(info) => basic::enum_from_host(ctx, info, value).map(Marshaled::plain),
        ArgKind::Flags(info) => basic::flags_from_host(info, value).map(Marshaled::plain),
        ArgKind::Array(array) => container::array_from_host(ctx, arg, array, value),
        ArgKind::List(list) => container::list_from_host(ctx, arg, list, value),
        ArgKind::HashTable(hash) => container::hash_from_host(ctx, arg, hash, value),
        ArgKind::Struct(s) => interface::struct_from_host(ctx, arg, s, value),
        ArgKind::Object(info) => interface::object_from_host(arg, info, value),
        ArgKind::Callback(cb) => callback::callback_from_host(ctx, arg, cb, value),
        ArgKind::Error => Err(MarshalError::not_implemented(
            "Marshalling for GError from host values is not implemented",
        )),
        ArgKind::DestroyNotify => Err(MarshalError::not_implemented(
            "Destroy notifies are filled from their callback, not from host values",
        )),
    }
}

/// Convert a native value into a host value, consuming it per `arg.transfer`
pub fn to_host(ctx: &OutContext<'_>, arg: &ArgCache, value: NativeValue) -> Result<HostValue> {
    trace!(event = "marshal_out", arg = %arg.name, kind = %arg.kind.name());
    match &arg.kind {
        ArgKind::Void { is_pointer: true } => Ok(match value {
            NativeValue::Pointer(p) => HostValue::Pointer(p),
            _ => HostValue::Pointer(0),
        }),
        ArgKind::Void { is_pointer: false } => Ok(HostValue::None),
        ArgKind::Boolean => Ok(HostValue::Bool(!value.is_zero())),
        ArgKind::Int(_) => basic::int_to_host(&value),
        ArgKind::Float(_) => basic::float_to_host(&value),
        ArgKind::UniChar => basic::unichar_to_host(&value),
        ArgKind::Utf8 => basic::utf8_to_host(arg, value),
        ArgKind::Filename => basic::filename_to_host(arg, value),
        ArgKind::Enum(info) => basic::enum_to_host(info, &value),
        ArgKind::Flags(info) => basic::flags_to_host(info, &value),
        ArgKind::Array(array) => container::array_to_host(ctx, arg, array, value),
        ArgKind::List(list) => container::list_to_host(ctx, arg, list, value),
        ArgKind::HashTable(hash) => container::hash_to_host(ctx, arg, hash, value),
        ArgKind::Struct(s) => interface::struct_to_host(arg, s, value),
        ArgKind::Object(_) => interface::object_to_host(ctx, arg, value),
        ArgKind::Error => Ok(match value {
            NativeValue::Error(Some(err)) => {
                HostValue::Exception(Arc::new(crate::host::HostException::from_native_error(&err)))
            }
            _ => HostValue::None,
        }),
        ArgKind::Callback(_) => {
            release_native(arg, &value);
            Err(MarshalError::not_implemented(
                "Callback returns are not supported",
            ))
        }
        ArgKind::DestroyNotify => Err(MarshalError::not_implemented(
            "Destroy notifies cannot be marshaled to host values",
        )),
    }
}

#[cfg(test)]
mod tests;

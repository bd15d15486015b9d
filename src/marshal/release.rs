//! Releasing native values that never reach the host

use tracing::trace;

use crate::cache::{ArgCache, ArgKind};
use crate::introspection::Transfer;
use crate::native::{ArrayData, NativeValue};

/// Drop whatever the binding owns of `value` under `arg`'s transfer rule.
///
/// Used for outputs left unconverted after a failure. Never fails.
pub fn release_native(arg: &ArgCache, value: &NativeValue) {
    let owns_value = arg.transfer == Transfer::Everything;
    let owns_container = arg.transfer != Transfer::Nothing || arg.is_caller_allocates;
    trace!(event = "release_native", arg = %arg.name, owns_value, owns_container);

    match (&arg.kind, value) {
        (ArgKind::Utf8 | ArgKind::Filename, NativeValue::String(Some(s))) if owns_value => {
            s.alloc().free();
        }
        (ArgKind::Array(array), NativeValue::Array(Some(native))) => {
            if owns_value {
                if let ArrayData::Items(items) = native.snapshot() {
                    for item in items.iter().filter(|i| !i.is_zero()) {
                        release_native(&array.element, item);
                    }
                }
            }
            if owns_container {
                native.alloc().free();
            }
        }
        (ArgKind::List(list), NativeValue::List(Some(native))) => {
            if owns_value {
                for item in native.items() {
                    release_native(&list.element, item);
                }
            }
            if owns_container {
                native.alloc().free();
            }
        }
        (ArgKind::HashTable(hash), NativeValue::HashTable(Some(native))) => {
            if owns_value {
                for (key, val) in native.entries() {
                    release_native(&hash.key, key);
                    release_native(&hash.value, val);
                }
            }
            if owns_container {
                native.alloc().free();
            }
        }
        (ArgKind::Struct(s), value) if s.foreign.is_some() && owns_value && !value.is_zero() => {
            if let Some(marshaler) = &s.foreign {
                marshaler.release(value);
            }
        }
        (ArgKind::Struct(_), NativeValue::Boxed(Some(boxed))) if owns_value || arg.is_caller_allocates => {
            boxed.free();
        }
        (ArgKind::Object(_), NativeValue::Object(Some(obj))) if owns_value => obj.release(),
        (ArgKind::Callback(_), NativeValue::Callback(Some(closure))) if owns_value => closure.release(),
        _ => {}
    }
}

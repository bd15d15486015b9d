//! Structs, boxed values and objects

use std::sync::Arc;

use super::basic::expected;
use super::{CleanupData, InContext, Marshaled, OutContext, Owned};
use crate::bridge::HostBoxed;
use crate::cache::{ArgCache, StructCache};
use crate::errors::Result;
use crate::host::HostValue;
use crate::introspection::{ObjectInfo, StructKind, Transfer};
use crate::native::NativeValue;

pub(super) fn struct_from_host(
    ctx: &InContext<'_>,
    arg: &ArgCache,
    s: &StructCache,
    value: &HostValue,
) -> Result<Marshaled> {
    if value.is_none() && arg.allow_none {
        return Ok(Marshaled::plain(NativeValue::Boxed(None)));
    }

    if let Some(marshaler) = &s.foreign {
        let native = marshaler.to_native(ctx.heap(), value, arg.transfer)?;
        let mut cleanup = CleanupData::new();
        cleanup.own(
            arg.transfer,
            Owned::Foreign {
                value: native.clone(),
                marshaler: Arc::clone(marshaler),
            },
        );
        return Ok(Marshaled::owned(native, cleanup));
    }

    let boxed = match value {
        HostValue::Boxed(b) if b.info().full_name() == s.info.full_name() => b,
        other => return Err(expected(&s.info.full_name(), other)),
    };

    if arg.transfer == Transfer::Everything {
        // The callee takes ownership of a copy; the wrapper keeps its own value
        let copy = boxed.native().copy();
        let mut cleanup = CleanupData::new();
        cleanup.transfer(Owned::Boxed(Arc::clone(&copy)));
        return Ok(Marshaled::owned(NativeValue::Boxed(Some(copy)), cleanup));
    }
    Ok(Marshaled::plain(NativeValue::Boxed(Some(Arc::clone(boxed.native())))))
}

pub(super) fn struct_to_host(arg: &ArgCache, s: &StructCache, value: NativeValue) -> Result<HostValue> {
    if let Some(marshaler) = &s.foreign {
        if value.is_zero() {
            return Ok(HostValue::None);
        }
        // The converter applies the transfer rule itself
        return marshaler.from_native(&value, arg.transfer);
    }

    let NativeValue::Boxed(Some(native)) = value else {
        return Ok(HostValue::None);
    };
    let wrapper = if arg.transfer == Transfer::Everything || arg.is_caller_allocates {
        HostBoxed::new(&s.info, native, true)
    } else if s.info.kind == StructKind::Variant {
        // Keep the value alive for the wrapper's lifetime
        HostBoxed::new(&s.info, native.copy(), true)
    } else {
        HostBoxed::new(&s.info, native, false)
    };
    Ok(HostValue::Boxed(wrapper))
}

pub(super) fn object_from_host(arg: &ArgCache, info: &Arc<ObjectInfo>, value: &HostValue) -> Result<Marshaled> {
    let obj = match value {
        HostValue::None if arg.allow_none => return Ok(Marshaled::plain(NativeValue::Object(None))),
        HostValue::Object(wrapper) if wrapper.native().is_a(info) => wrapper.native(),
        other => return Err(expected(&info.full_name(), other)),
    };

    if arg.transfer == Transfer::Everything {
        obj.acquire();
        let mut cleanup = CleanupData::new();
        cleanup.transfer(Owned::Object(Arc::clone(obj)));
        return Ok(Marshaled::owned(NativeValue::Object(Some(Arc::clone(obj))), cleanup));
    }
    Ok(Marshaled::plain(NativeValue::Object(Some(Arc::clone(obj)))))
}

pub(super) fn object_to_host(ctx: &OutContext<'_>, arg: &ArgCache, value: NativeValue) -> Result<HostValue> {
    let NativeValue::Object(Some(obj)) = value else {
        return Ok(HostValue::None);
    };
    let transfer = match arg.transfer {
        Transfer::Everything => Transfer::Everything,
        Transfer::Container | Transfer::Nothing => Transfer::Nothing,
    };
    Ok(HostValue::Object(ctx.runtime.wrappers().wrap(&obj, transfer)))
}

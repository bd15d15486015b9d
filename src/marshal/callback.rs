//! Host callables handed to native code as closures

use smallvec::smallvec;
use std::sync::Arc;

use super::{CleanupData, InContext, Marshaled, Owned};
use crate::bridge::ClosureCell;
use crate::cache::{ArgCache, CallbackCache};
use crate::errors::{MarshalError, Result};
use crate::host::HostValue;
use crate::introspection::ScopeType;
use crate::invoke::HostArg;
use crate::native::{NativeClosure, NativeValue};

/// User data the caller supplied for this callback, already spread
fn user_data(ctx: &InContext<'_>, cb: &CallbackCache) -> Option<Vec<HostValue>> {
    let callable = ctx.callable?;
    let host_index = callable.args.get(cb.user_data_index?)?.host_arg_index?;
    match ctx.host_args.get(host_index)? {
        HostArg::Default => None,
        HostArg::Value(value) if callable.user_data_varargs_index == Some(host_index) => match value {
            HostValue::Tuple(items) => Some(items.to_vec()),
            other => Some(vec![other.clone()]),
        },
        HostArg::Value(value) => Some(vec![value.clone()]),
    }
}

pub(super) fn callback_from_host(
    ctx: &InContext<'_>,
    arg: &ArgCache,
    cb: &CallbackCache,
    value: &HostValue,
) -> Result<Marshaled> {
    let data = user_data(ctx, cb);

    let callable = match value {
        HostValue::None if arg.allow_none => {
            if data.as_ref().is_some_and(|d| d.iter().any(|v| !v.is_none())) {
                return Err(MarshalError::type_error(
                    "When passing None for a callback userdata must also be None",
                ));
            }
            let mut marshaled = Marshaled::plain(NativeValue::Callback(None));
            if let Some(index) = cb.user_data_index {
                marshaled.children.push((index, NativeValue::Pointer(0)));
            }
            if let Some(index) = cb.destroy_index {
                marshaled.children.push((index, NativeValue::DestroyNotify(None)));
            }
            return Ok(marshaled);
        }
        HostValue::Callable(callable) => callable,
        other => {
            return Err(MarshalError::type_error(format!(
                "Callback needs to be a function or method not {}",
                other.type_name()
            )))
        }
    };

    let closure = ClosureCell::new(ctx.runtime, Arc::clone(&cb.cache), callable.clone(), data, cb.scope);
    if let Some(owner) = ctx.owner {
        owner.track_closure(&closure);
    }

    let mut children = smallvec![];
    if let Some(index) = cb.user_data_index {
        children.push((index, closure.user_data_pointer()));
    }
    if let Some(index) = cb.destroy_index {
        children.push((index, NativeValue::DestroyNotify(Some(closure.destroy_notify()))));
    }

    let native: NativeClosure = closure;
    let mut cleanup = CleanupData::new();
    match cb.scope {
        ScopeType::Call => cleanup.retain(Owned::Closure(Arc::clone(&native))),
        ScopeType::Async | ScopeType::Notified | ScopeType::Forever => {
            cleanup.transfer(Owned::Closure(Arc::clone(&native)))
        }
    }

    Ok(Marshaled {
        value: NativeValue::Callback(Some(native)),
        cleanup,
        children,
    })
}

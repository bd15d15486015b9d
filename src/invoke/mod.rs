//! Callable invocation
//!
//! Design: one invocation is a forward-only state machine over a stack-local
//! `InvocationState`. Every stage has a matching cleanup, so the set of
//! native resources released on failure is decided by the stage reached and
//! nothing else. See `cleanup` for the table.

mod args;
mod call;
mod cleanup;

pub use args::{combine_args, HostArg};
pub use cleanup::Stage;

use std::sync::Arc;

use crate::bridge::Runtime;
use crate::cache::InvokerKind;
use crate::errors::{MarshalError, Result};
use crate::host::{HostGuard, HostValue};
use crate::introspection::CallableInfo;
use crate::native::NativeFn;
use call::Target;

/// Invoke a function, method or virtual function.
///
/// Returns `None` when the callable has no outputs, the single output when it
/// has one, and a tuple (return value first) otherwise.
pub fn invoke(
    runtime: &Arc<Runtime>,
    guard: &mut HostGuard<'_>,
    info: &Arc<CallableInfo>,
    args: &[HostValue],
    kwargs: &[(&str, HostValue)],
) -> Result<HostValue> {
    let cache = runtime.cache_for(info)?;
    if matches!(cache.invoker, InvokerKind::Callback) {
        return Err(MarshalError::not_implemented(format!(
            "{}() is a callback signature and needs a resolved target",
            cache.name
        )));
    }
    call::run(runtime, guard, &cache, Target::Cache, args, kwargs)
}

/// Invoke native code through an already-resolved pointer using `info`'s
/// signature (typically a callback handed to the host by native code)
pub fn invoke_callback(
    runtime: &Arc<Runtime>,
    guard: &mut HostGuard<'_>,
    info: &Arc<CallableInfo>,
    target: &NativeFn,
    args: &[HostValue],
    kwargs: &[(&str, HostValue)],
) -> Result<HostValue> {
    let cache = runtime.cache_for(info)?;
    call::run(runtime, guard, &cache, Target::Resolved(target.clone()), args, kwargs)
}

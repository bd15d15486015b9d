//! Invocation state machine
//!
//! COMBINE_ARGS -> ALLOC_STORAGE -> MARSHAL_IN -> NATIVE_CALL -> MARSHAL_OUT -> DONE
//!
//! Transitions only move forward. Any failure runs the cleanup for the stage
//! reached and surfaces exactly one error; partial results are never
//! returned. The state lives on the caller's stack, so nested invocations
//! from callbacks never share it.

use std::collections::TryReserveError;
use std::sync::Arc;
use tracing::{debug, debug_span};

use super::args::{combine_args, HostArg};
use super::cleanup::{cleanup, Stage, Tokens};
use crate::bridge::Runtime;
use crate::cache::{ArgCache, ArgKind, CallableCache, InvokerKind, MetaRole};
use crate::errors::{MarshalError, Result};
use crate::host::{HostGuard, HostValue};
use crate::marshal::{self, release_native, InContext, OutContext, Owned};
use crate::native::{BoxedInstance, NativeArray, NativeError, NativeFn, NativeFrame, NativeValue};

/// Where the native entry point comes from
#[derive(Debug, Clone)]
pub(crate) enum Target {
    /// Chosen by the cache: a function address or a vfunc lookup
    Cache,
    /// Already-resolved callback pointer
    Resolved(NativeFn),
}

/// One logical output, in framing order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Output {
    Return,
    Arg(usize),
}

pub(crate) struct InvocationState<'a> {
    pub(super) runtime: &'a Arc<Runtime>,
    pub(super) cache: &'a CallableCache,
    pub(super) stage: Stage,
    /// One slot per native argument position
    pub(super) native_args: Vec<NativeValue>,
    pub(super) ret: NativeValue,
    pub(super) error: Option<NativeError>,
    pub(super) tokens: Tokens,
}

impl<'a> InvocationState<'a> {
    /// Size every per-argument array up front; failure is fatal
    fn alloc(runtime: &'a Arc<Runtime>, cache: &'a CallableCache) -> Result<Self> {
        let n = cache.args.len();
        let oom = |err: TryReserveError| MarshalError::OutOfMemory(format!("{}(): {}", cache.name, err));

        let mut native_args = Vec::new();
        native_args.try_reserve_exact(n).map_err(oom)?;
        native_args.extend(cache.args.iter().map(|a| a.kind.zero_value()));

        let mut in_tokens = Vec::new();
        in_tokens.try_reserve_exact(n).map_err(oom)?;
        in_tokens.resize_with(n, || None);

        let mut out_storage = Vec::new();
        out_storage.try_reserve_exact(n).map_err(oom)?;
        out_storage.resize_with(n, || None);

        Ok(Self {
            runtime,
            cache,
            stage: Stage::AllocStorage,
            native_args,
            ret: cache.return_cache.kind.zero_value(),
            error: None,
            tokens: Tokens {
                in_tokens,
                out_storage,
            },
        })
    }

    pub(super) fn outputs(&self) -> Vec<Output> {
        let mut outputs = Vec::with_capacity(self.cache.n_outputs());
        if self.cache.has_return() {
            outputs.push(Output::Return);
        }
        outputs.extend(self.cache.to_host_args.iter().map(|&i| Output::Arg(i)));
        outputs
    }

    /// Storage the binding provides for a caller-allocates out-argument
    fn alloc_caller_storage(&self, arg: &ArgCache) -> Result<(NativeValue, Owned, Option<(usize, NativeValue)>)> {
        let heap = self.runtime.heap();
        match &arg.kind {
            ArgKind::Struct(s) => {
                let vtable = self.runtime.types().boxed_vtable(&s.info);
                let boxed = BoxedInstance::new(heap, &s.info.full_name(), vtable);
                Ok((NativeValue::Boxed(Some(Arc::clone(&boxed))), Owned::Boxed(boxed), None))
            }
            ArgKind::Array(array) => {
                let capacity = array.fixed_size.unwrap_or(0);
                let native = if array.is_byte_sized() {
                    NativeArray::from_bytes(heap, array.array_type, vec![0; capacity])
                } else {
                    NativeArray::from_items(heap, array.array_type, vec![array.element.kind.zero_value(); capacity])
                };
                // The length companion reports the buffer capacity
                let length = array.length_index.and_then(|index| match &self.cache.args.get(index)?.kind {
                    ArgKind::Int(width) => width.to_native(capacity as i128).map(|v| (index, v)),
                    _ => None,
                });
                let owned = Owned::Memory(native.alloc().clone());
                Ok((NativeValue::Array(Some(native)), owned, length))
            }
            other => Err(MarshalError::not_implemented(format!(
                "caller-allocated {} is not supported",
                other.name()
            ))),
        }
    }

    fn marshal_in(&mut self, host_args: &[HostArg]) -> Result<()> {
        let cache = self.cache;
        let owner = match host_args.first() {
            Some(HostArg::Value(HostValue::Object(wrapper))) if cache.has_instance => Some(wrapper),
            _ => None,
        };
        let ctx = InContext {
            runtime: self.runtime,
            callable: Some(cache),
            host_args,
            owner,
        };

        for (index, arg) in cache.args.iter().enumerate() {
            self.stage = Stage::MarshalIn(index);

            if arg.is_caller_allocates {
                let (value, owned, length) = self.alloc_caller_storage(arg)?;
                self.native_args[index] = value;
                self.tokens.out_storage[index] = Some(owned);
                if let Some((child, value)) = length {
                    self.native_args[child] = value;
                }
                continue;
            }
            if !arg.direction.is_from_host() || arg.is_child() {
                continue;
            }
            // User data is filled in by its callback
            if let MetaRole::Closure { callback } = arg.meta {
                if callback != index {
                    continue;
                }
            }

            let value = match arg.host_arg_index.and_then(|p| host_args.get(p)) {
                Some(HostArg::Value(value)) => value,
                Some(HostArg::Default) | None => {
                    self.native_args[index] = arg.default_value.clone();
                    continue;
                }
            };
            let marshaled = marshal::from_host(&ctx, arg, value)?;
            self.native_args[index] = marshaled.value;
            for (child, value) in marshaled.children {
                if let Some(slot) = self.native_args.get_mut(child) {
                    *slot = value;
                }
            }
            self.tokens.in_tokens[index] = Some(marshaled.cleanup);
        }
        Ok(())
    }

    fn resolve(&self, target: &Target) -> Result<NativeFn> {
        match (target, &self.cache.invoker) {
            (Target::Resolved(func), _) => Ok(func.clone()),
            (Target::Cache, InvokerKind::Function(func)) => Ok(func.clone()),
            (Target::Cache, InvokerKind::VFunc { container, name }) => {
                let instance = self
                    .native_args
                    .first()
                    .and_then(NativeValue::as_object)
                    .ok_or_else(|| MarshalError::type_error(format!("{}() requires an instance", self.cache.name)))?;
                self.runtime
                    .types()
                    .lookup_vfunc(instance.class(), name)
                    .ok_or_else(|| {
                        MarshalError::not_implemented(format!(
                            "{} does not implement {}.{}",
                            instance.class().full_name(),
                            container.full_name(),
                            name
                        ))
                    })
            }
            (Target::Cache, InvokerKind::Callback) => Err(MarshalError::not_implemented(format!(
                "{}() is a callback signature and needs a resolved target",
                self.cache.name
            ))),
        }
    }

    fn call_native(&mut self, guard: &mut HostGuard<'_>, target: &Target) -> Result<()> {
        self.stage = Stage::NativeCall;
        let func = self.resolve(target)?;
        let heap = Arc::clone(self.runtime.heap());
        let release_lock = self.runtime.config().invoke.release_host_lock;

        let (args, ret, error) = (&mut self.native_args, &mut self.ret, &mut self.error);
        let mut call = move || {
            let mut frame = NativeFrame::new(args.as_mut_slice(), ret, error, &heap);
            func.call(&mut frame)
        };
        let ok = if release_lock { guard.allow_threads(call) } else { call() };

        // Checked even when the call reports success
        if let Some(err) = self.error.take() {
            return Err(err.into());
        }
        if !ok {
            return Err(NativeError::call_failed(&self.cache.name).into());
        }
        Ok(())
    }

    fn marshal_out(&mut self) -> Result<HostValue> {
        let cache = self.cache;
        if cache.skip_return {
            release_native(&cache.return_cache, &std::mem::take(&mut self.ret));
        }

        let outputs = self.outputs();
        // Companion lengths are read from this view while outputs are consumed
        let view = self.native_args.clone();
        let ctx = OutContext {
            runtime: self.runtime,
            callable: Some(cache),
            native_args: &view,
        };

        let mut values = Vec::with_capacity(outputs.len());
        for (position, output) in outputs.iter().enumerate() {
            self.stage = Stage::MarshalOut(position);
            let (arg, value) = match *output {
                Output::Return => (&cache.return_cache, std::mem::take(&mut self.ret)),
                Output::Arg(index) => (&cache.args[index], std::mem::take(&mut self.native_args[index])),
            };
            values.push(marshal::to_host(&ctx, arg, value)?);
        }

        Ok(match values.len() {
            0 => HostValue::None,
            1 => values.pop().unwrap_or(HostValue::None),
            _ => HostValue::tuple(values),
        })
    }
}

/// Drive one invocation through every stage
pub(crate) fn run(
    runtime: &Arc<Runtime>,
    guard: &mut HostGuard<'_>,
    cache: &CallableCache,
    target: Target,
    args: &[HostValue],
    kwargs: &[(&str, HostValue)],
) -> Result<HostValue> {
    let span = debug_span!("invoke", callable = %cache.name);
    let _entered = span.enter();
    runtime.record_call();

    let host_args = combine_args(cache, args, kwargs).map_err(|err| {
        runtime.record_marshal_failure();
        err
    })?;

    let mut state = InvocationState::alloc(runtime, cache)?;

    if let Err(err) = state.marshal_in(&host_args) {
        debug!(event = "marshal_in_failed", stage = ?state.stage, error = %err);
        let stage = state.stage;
        cleanup(&mut state, stage);
        runtime.record_marshal_failure();
        return Err(err);
    }

    if let Err(err) = state.call_native(guard, &target) {
        debug!(event = "native_call_failed", error = %err);
        cleanup(&mut state, Stage::NativeCall);
        runtime.record_native_failure();
        return Err(err);
    }

    match state.marshal_out() {
        Ok(value) => {
            state.stage = Stage::Done;
            cleanup(&mut state, Stage::Done);
            Ok(value)
        }
        Err(err) => {
            debug!(event = "marshal_out_failed", stage = ?state.stage, error = %err);
            let stage = state.stage;
            cleanup(&mut state, stage);
            runtime.record_marshal_failure();
            Err(err)
        }
    }
}
